/*
 * @Date         : 2026-02-05
 * @Description  : 神经网络计算图
 *
 * 一个图实例同一时刻只执行一轮“前向-反向”传播。各部分实现拆分在子模块中：
 * - builder.rs：校验声明、插入形状适配器、推断类型、分配扁平参数缓冲
 * - topo.rs：确定性的拓扑排序
 * - forward.rs / backward.rs：带掩码传播的前向、反向执行
 * - training.rs：损失、打分与单步训练
 * - params.rs：扁平参数/梯度缓冲及按名访问
 * - transfer.rs：冻结、特征提取子图与迁移学习构建器
 * - model_io.rs：模型保存/加载
 * - summary.rs：文本摘要
 */

mod backward;
mod builder;
mod error;
mod forward;
mod model_io;
mod params;
mod summary;
mod topo;
mod training;
mod transfer;

pub use error::GraphError;
pub use transfer::TransferBuilder;

use crate::nn::descriptor::GraphDescriptor;
use crate::nn::nodes::{NodeRegistry, NodeType, ParamSlot, TraitNode};
use crate::nn::InputType;
use crate::tensor::Tensor;
use std::collections::HashMap;
use std::sync::Arc;

/// 一轮传播所处的阶段。前向或反向中途失败时回到`Idle`，所有暂存状态随之作废
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Idle,
    ForwardComplete,
    BackwardComplete,
}

/// 图中的一个节点
#[derive(Debug, Clone)]
pub(in crate::nn) struct GraphNode {
    pub(in crate::nn) name: String,
    pub(in crate::nn) node: NodeType,
    /// 输入节点下标（已经过适配器改道），按输入槽排序
    pub(in crate::nn) inputs: Vec<usize>,
    pub(in crate::nn) frozen: bool,
    /// 构图时自动插入的适配器
    pub(in crate::nn) synthetic: bool,
    pub(in crate::nn) output_type: InputType,
    /// 各参数在扁平缓冲中的位置，与`param_specs`顺序一致
    pub(in crate::nn) params: Vec<ParamSlot>,
}

impl GraphNode {
    pub(in crate::nn) fn param_range(&self) -> std::ops::Range<usize> {
        match (self.params.first(), self.params.last()) {
            (Some(first), Some(last)) => first.offset..last.range().end,
            _ => 0..0,
        }
    }
}

/// 每轮传播的暂存状态，下标与`Graph::nodes`一致
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct PassCache {
    pub(in crate::nn) state: PassState,
    pub(in crate::nn) training: bool,
    pub(in crate::nn) batch_size: usize,
    pub(in crate::nn) activations: Vec<Option<Tensor>>,
    pub(in crate::nn) masks: Vec<Option<Tensor>>,
    /// 损失对各节点输出的梯度（所有消费者贡献之和）
    pub(in crate::nn) epsilons: Vec<Option<Tensor>>,
}

/// 计算图
///
/// `nodes`按求值顺序存放（自动插入的适配器紧挨在其消费者之前），
/// 因此正序遍历即前向顺序，逆序遍历即反向顺序。
/// `Clone`是深拷贝：克隆出的图拥有独立的参数/梯度缓冲。
#[derive(Debug, Clone)]
pub struct Graph {
    descriptor: GraphDescriptor,
    registry: Arc<NodeRegistry>,
    pub(in crate::nn) nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    /// 输入节点下标，按声明顺序
    pub(in crate::nn) inputs: Vec<usize>,
    /// 输出节点下标，按`outputs`声明顺序
    pub(in crate::nn) outputs: Vec<usize>,
    consumers: Vec<Vec<usize>>,
    pub(in crate::nn) params: Vec<f32>,
    pub(in crate::nn) grads: Vec<f32>,
    pub(in crate::nn) pass: PassCache,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// 当前结构的描述符（冻结标记取当前值），即保存模型时写入JSON的内容
    pub fn descriptor(&self) -> GraphDescriptor {
        let mut desc = self.descriptor.clone();
        for node in &mut desc.nodes {
            if let Some(&idx) = self.index.get(&node.name) {
                node.frozen = self.nodes[idx].frozen;
            }
        }
        desc
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        self.descriptor().to_json()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// 求值顺序（含自动插入的适配器）
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// 反向传播顺序，即求值顺序的逆序
    pub fn backward_order(&self) -> Vec<&str> {
        self.nodes.iter().rev().map(|n| n.name.as_str()).collect()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|&i| self.nodes[i].name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|&i| self.nodes[i].name.as_str()).collect()
    }

    /// 节点的实际输入（经适配器改道后），按输入槽排序
    pub fn node_inputs(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let node = self.node(name)?;
        Ok(node.inputs.iter().map(|&i| self.nodes[i].name.as_str()).collect())
    }

    pub fn consumers_of(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let idx = self.node_index(name)?;
        Ok(self.consumers[idx]
            .iter()
            .map(|&i| self.nodes[i].name.as_str())
            .collect())
    }

    pub fn node_type_name(&self, name: &str) -> Result<&str, GraphError> {
        Ok(self.node(name)?.node.type_name())
    }

    pub fn output_type(&self, name: &str) -> Result<InputType, GraphError> {
        Ok(self.node(name)?.output_type)
    }

    pub fn is_synthetic(&self, name: &str) -> Result<bool, GraphError> {
        Ok(self.node(name)?.synthetic)
    }

    pub fn pass_state(&self) -> PassState {
        self.pass.state
    }

    pub(in crate::nn) fn node_index(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    pub(in crate::nn) fn node(&self, name: &str) -> Result<&GraphNode, GraphError> {
        Ok(&self.nodes[self.node_index(name)?])
    }

    /// 丢弃本轮传播的所有暂存状态
    pub(in crate::nn) fn invalidate_pass(&mut self) {
        self.pass = PassCache::default();
    }
}
