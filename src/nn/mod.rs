/*
 * @Date         : 2026-02-04
 * @Description  : 负责神经网络计算图（computation graph）的构建、执行与训练
 */

mod averaging;
mod criterion;
mod data;
mod descriptor;
mod graph;
mod mask;
mod nodes;
pub mod optimizer;
mod shape;

pub use averaging::{AggregationTuple, ParameterAveraging};
pub use criterion::LossFunction;
pub use data::MultiDataSet;
pub use descriptor::{
    EdgeDescriptor, GraphBuilder, GraphDescriptor, NodeDescriptor, NodeTypeDescriptor,
};
pub use graph::{Graph, GraphError, PassState, TransferBuilder};
pub use mask::{MaskPolicy, combine_masks};
pub use nodes::{
    Activation, Backprop, BackwardContext, CustomLayer, ElementWiseOp, ForwardContext, NodeFactory,
    NodeRegistry, ParamInit, ParamSpec, ParamView, PoolingType, Preprocessor, TraitNode,
};
pub use optimizer::{Adam, Optimizer, Sgd};
pub use shape::{InputType, ShapeKind};

#[cfg(test)]
mod tests;
