/*
 * @Date         : 2026-02-05
 * @Description  : 外部实现的自定义节点，及按类型名构造它们的注册表
 */

use crate::nn::nodes::{
    BackwardContext, Backprop, ForwardContext, ParamSpec, ParamView, TraitNode,
};
use crate::nn::{GraphError, InputType, LossFunction, MaskPolicy, ShapeKind};
use crate::tensor::Tensor;
use std::collections::HashMap;
use std::fmt;

/// 可放进计算图的自定义节点
pub trait CustomLayer: TraitNode + Send + Sync + fmt::Debug {
    fn clone_box(&self) -> Box<dyn CustomLayer>;
}

/// 由配置（JSON值）构造自定义节点的工厂
pub type NodeFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn CustomLayer>, GraphError> + Send + Sync>;

/// 自定义节点类型名 -> 工厂
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: &str, factory: F) -> &mut Self
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn CustomLayer>, GraphError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub(crate) fn create(
        &self,
        type_name: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn CustomLayer>, GraphError> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            GraphError::Configuration(format!("未注册的自定义节点类型`{type_name}`"))
        })?;
        factory(config)
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.factories.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("NodeRegistry").field("types", &names).finish()
    }
}

#[derive(Debug)]
pub(crate) struct CustomNode(Box<dyn CustomLayer>);

impl CustomNode {
    pub(crate) fn new(inner: Box<dyn CustomLayer>) -> Self {
        Self(inner)
    }
}

impl Clone for CustomNode {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl TraitNode for CustomNode {
    fn type_name(&self) -> &str {
        self.0.type_name()
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        self.0.input_kind()
    }

    fn accepts_multiple_inputs(&self) -> bool {
        self.0.accepts_multiple_inputs()
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        self.0.output_type(inputs)
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        self.0.param_specs()
    }

    fn num_params(&self) -> usize {
        self.0.num_params()
    }

    fn is_learnable(&self) -> bool {
        self.0.is_learnable()
    }

    fn mask_policy(&self) -> MaskPolicy {
        self.0.mask_policy()
    }

    fn loss(&self) -> Option<LossFunction> {
        self.0.loss()
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        self.0.forward(inputs, params, ctx)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        self.0.backward(grad, params, ctx)
    }
}
