/*
 * @Date         : 2026-02-05
 * @Description  : 图描述符（Graph Descriptor）及其流式构建器（GraphBuilder）
 *                 描述符是图的声明式配置：有序的节点声明、有序的边声明、输出节点名与随机种子，
 *                 同时也是模型保存时写入JSON的拓扑部分
 */

use super::{
    Activation, ElementWiseOp, Graph, GraphError, InputType, LossFunction, NodeRegistry,
    PoolingType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// 当前描述符格式版本
pub const DESCRIPTOR_VERSION: &str = "1.0";

/// 缺省随机种子
pub const DEFAULT_SEED: u64 = 12345;

/// 图的可序列化描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    /// 格式版本（用于向后兼容）
    pub version: String,
    /// 图名称
    #[serde(default)]
    pub name: String,
    /// 节点声明，其顺序即拓扑排序时的并列决胜顺序
    pub nodes: Vec<NodeDescriptor>,
    /// 边声明
    pub edges: Vec<EdgeDescriptor>,
    /// 输出节点名（有序）
    pub outputs: Vec<String>,
    /// 参数初始化用的随机种子
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// 已完成的训练步数（每次成功的参数更新加1）
    #[serde(default)]
    pub iteration_count: u64,
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// 节点声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub node_type: NodeTypeDescriptor,
    /// 冻结的节点照常参与前向与反向计算，但其自身参数的梯度不会被应用
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub frozen: bool,
}

/// 边声明：生产者 -> 消费者的第`slot`个输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub from: String,
    pub to: String,
    pub slot: usize,
}

/// 节点类型描述（包含类型特定参数）。`n_in`缺省时由输入类型推断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeTypeDescriptor {
    Input {
        input_type: InputType,
    },
    Dense {
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
        has_bias: bool,
    },
    Output {
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
        loss: Option<LossFunction>,
    },
    SimpleRnn {
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
    },
    RnnOutput {
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
        loss: Option<LossFunction>,
    },
    Convolution {
        n_in: Option<usize>,
        n_out: usize,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
        activation: Activation,
    },
    Subsampling {
        kernel: [usize; 2],
        stride: [usize; 2],
        pooling: PoolingType,
    },
    Merge,
    Subset {
        from: usize,
        to: usize,
    },
    ElementWise {
        op: ElementWiseOp,
    },
    Custom {
        type_name: String,
        #[serde(default)]
        config: serde_json::Value,
    },
}

impl NodeTypeDescriptor {
    pub const fn dense(n_out: usize, activation: Activation) -> Self {
        Self::Dense {
            n_in: None,
            n_out,
            activation,
            has_bias: true,
        }
    }

    pub const fn output(n_out: usize, activation: Activation, loss: LossFunction) -> Self {
        Self::Output {
            n_in: None,
            n_out,
            activation,
            loss: Some(loss),
        }
    }

    /// 没有损失函数的输出层，只能靠外部注入的误差训练
    pub const fn output_without_loss(n_out: usize, activation: Activation) -> Self {
        Self::Output {
            n_in: None,
            n_out,
            activation,
            loss: None,
        }
    }

    pub const fn simple_rnn(n_out: usize, activation: Activation) -> Self {
        Self::SimpleRnn {
            n_in: None,
            n_out,
            activation,
        }
    }

    pub const fn rnn_output(n_out: usize, activation: Activation, loss: LossFunction) -> Self {
        Self::RnnOutput {
            n_in: None,
            n_out,
            activation,
            loss: Some(loss),
        }
    }

    pub const fn convolution(
        n_out: usize,
        kernel: [usize; 2],
        stride: [usize; 2],
        activation: Activation,
    ) -> Self {
        Self::Convolution {
            n_in: None,
            n_out,
            kernel,
            stride,
            padding: [0, 0],
            activation,
        }
    }

    pub const fn subsampling(kernel: [usize; 2], stride: [usize; 2], pooling: PoolingType) -> Self {
        Self::Subsampling {
            kernel,
            stride,
            pooling,
        }
    }

    pub fn custom(type_name: &str, config: serde_json::Value) -> Self {
        Self::Custom {
            type_name: type_name.to_string(),
            config,
        }
    }

    /// 显式声明输入尺寸（与推断结果不一致时构图失败）
    pub fn with_n_in(mut self, value: usize) -> Self {
        match &mut self {
            Self::Dense { n_in, .. }
            | Self::Output { n_in, .. }
            | Self::SimpleRnn { n_in, .. }
            | Self::RnnOutput { n_in, .. }
            | Self::Convolution { n_in, .. } => *n_in = Some(value),
            _ => {}
        }
        self
    }

    /// 层：只接受1个输入，多个输入时由构建器插入隐式的合并顶点
    pub const fn is_layer(&self) -> bool {
        matches!(
            self,
            Self::Dense { .. }
                | Self::Output { .. }
                | Self::SimpleRnn { .. }
                | Self::RnnOutput { .. }
                | Self::Convolution { .. }
                | Self::Subsampling { .. }
        )
    }

    /// 顶点：不含参数的图操作
    pub const fn is_vertex(&self) -> bool {
        matches!(
            self,
            Self::Merge | Self::Subset { .. } | Self::ElementWise { .. }
        )
    }
}

impl GraphDescriptor {
    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GraphError::Serialization(format!("序列化图描述失败: {e}")))
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json)
            .map_err(|e| GraphError::Serialization(format!("解析图描述失败: {e}")))
    }

    pub fn node(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// 某节点按slot排好序的输入节点名
    pub fn inputs_of(&self, name: &str) -> Vec<&str> {
        let mut edges = self.edges.iter().filter(|e| e.to == name).collect::<Vec<_>>();
        edges.sort_by_key(|e| e.slot);
        edges.into_iter().map(|e| e.from.as_str()).collect()
    }
}

// ========== GraphBuilder ==========

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BuilderEntry {
    pub(crate) name: String,
    pub(crate) node_type: NodeTypeDescriptor,
    pub(crate) inputs: Vec<String>,
    pub(crate) frozen: bool,
}

/// 图的流式构建器
///
/// # 示例
/// ```ignore
/// let graph = GraphBuilder::new()
///     .add_inputs(&["in"])
///     .set_input_types(&[InputType::feed_forward(4)])
///     .add_layer("dense", NodeTypeDescriptor::dense(3, Activation::Tanh), &["in"])
///     .add_layer(
///         "out",
///         NodeTypeDescriptor::output(2, Activation::Softmax, LossFunction::Mcxent),
///         &["dense"],
///     )
///     .set_outputs(&["out"])
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBuilder {
    name: String,
    inputs: Vec<String>,
    input_types: Vec<InputType>,
    pub(crate) entries: Vec<BuilderEntry>,
    pub(crate) outputs: Vec<String>,
    seed: u64,
    error: Option<GraphError>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub const fn new() -> Self {
        Self {
            name: String::new(),
            inputs: Vec::new(),
            input_types: Vec::new(),
            entries: Vec::new(),
            outputs: Vec::new(),
            seed: DEFAULT_SEED,
            error: None,
        }
    }

    /// 由现有描述符还原出构建器（输入节点、按slot排序的输入边、冻结标记都被保留）
    pub fn from_descriptor(desc: &GraphDescriptor) -> Self {
        let mut builder = Self::new().seed(desc.seed).name(&desc.name);
        for node in &desc.nodes {
            if let NodeTypeDescriptor::Input { input_type } = &node.node_type {
                builder.inputs.push(node.name.clone());
                builder.input_types.push(*input_type);
            } else {
                builder.entries.push(BuilderEntry {
                    name: node.name.clone(),
                    node_type: node.node_type.clone(),
                    inputs: desc.inputs_of(&node.name).into_iter().map(String::from).collect(),
                    frozen: node.frozen,
                });
            }
        }
        builder.outputs = desc.outputs.clone();
        builder
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn add_inputs(mut self, names: &[&str]) -> Self {
        self.inputs.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn set_input_types(mut self, types: &[InputType]) -> Self {
        self.input_types = types.to_vec();
        self
    }

    /// 添加一个层；有多个输入时自动插入名为`<name>-merge`的合并顶点
    pub fn add_layer(mut self, name: &str, layer: NodeTypeDescriptor, inputs: &[&str]) -> Self {
        if !layer.is_layer() && !matches!(layer, NodeTypeDescriptor::Custom { .. }) {
            self.record_error(GraphError::Configuration(format!(
                "`{name}`不是层，请使用add_vertex添加"
            )));
            return self;
        }
        self.push_entry(name, layer, inputs);
        self
    }

    pub fn add_vertex(mut self, name: &str, vertex: NodeTypeDescriptor, inputs: &[&str]) -> Self {
        if !vertex.is_vertex() && !matches!(vertex, NodeTypeDescriptor::Custom { .. }) {
            self.record_error(GraphError::Configuration(format!(
                "`{name}`不是顶点，请使用add_layer添加"
            )));
            return self;
        }
        self.push_entry(name, vertex, inputs);
        self
    }

    pub fn set_outputs(mut self, names: &[&str]) -> Self {
        self.outputs = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 生成描述符
    pub fn descriptor(&self) -> Result<GraphDescriptor, GraphError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if self.inputs.len() != self.input_types.len() {
            return Err(GraphError::Configuration(format!(
                "输入节点有{}个，但输入类型有{}个",
                self.inputs.len(),
                self.input_types.len()
            )));
        }

        let mut nodes = self
            .inputs
            .iter()
            .zip(&self.input_types)
            .map(|(name, input_type)| NodeDescriptor {
                name: name.clone(),
                node_type: NodeTypeDescriptor::Input {
                    input_type: *input_type,
                },
                frozen: false,
            })
            .collect::<Vec<_>>();
        let mut edges = Vec::new();
        let connect = |edges: &mut Vec<EdgeDescriptor>, inputs: &[String], to: &str| {
            edges.extend(inputs.iter().enumerate().map(|(slot, from)| EdgeDescriptor {
                from: from.clone(),
                to: to.to_string(),
                slot,
            }));
        };

        for entry in &self.entries {
            if entry.node_type.is_layer() && entry.inputs.len() > 1 {
                let merge = format!("{}-merge", entry.name);
                nodes.push(NodeDescriptor {
                    name: merge.clone(),
                    node_type: NodeTypeDescriptor::Merge,
                    frozen: entry.frozen,
                });
                connect(&mut edges, &entry.inputs, &merge);
                connect(&mut edges, std::slice::from_ref(&merge), &entry.name);
            } else {
                connect(&mut edges, &entry.inputs, &entry.name);
            }
            nodes.push(NodeDescriptor {
                name: entry.name.clone(),
                node_type: entry.node_type.clone(),
                frozen: entry.frozen,
            });
        }

        Ok(GraphDescriptor {
            version: DESCRIPTOR_VERSION.to_string(),
            name: self.name.clone(),
            nodes,
            edges,
            outputs: self.outputs.clone(),
            seed: self.seed,
            iteration_count: 0,
        })
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        Graph::build(self.descriptor()?)
    }

    pub fn build_with_registry(self, registry: Arc<NodeRegistry>) -> Result<Graph, GraphError> {
        Graph::build_with_registry(self.descriptor()?, registry)
    }

    // ========== 供迁移学习使用的修改 ==========

    fn push_entry(&mut self, name: &str, node_type: NodeTypeDescriptor, inputs: &[&str]) {
        self.entries.push(BuilderEntry {
            name: name.to_string(),
            node_type,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            frozen: false,
        });
    }

    pub(crate) fn record_error(&mut self, error: GraphError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// 删除节点及其所有下游节点，并从输出列表中去掉它们
    pub(crate) fn remove_node_and_descendants(&mut self, name: &str) {
        if !self.entries.iter().any(|e| e.name == name) {
            self.record_error(GraphError::UnknownNode(name.to_string()));
            return;
        }
        let mut removed = HashSet::from([name.to_string()]);
        // 声明顺序不一定是拓扑序，所以迭代到不再有新节点被删除为止
        loop {
            let before = removed.len();
            for entry in &self.entries {
                if entry.inputs.iter().any(|i| removed.contains(i)) {
                    removed.insert(entry.name.clone());
                }
            }
            if removed.len() == before {
                break;
            }
        }
        self.entries.retain(|e| !removed.contains(&e.name));
        self.outputs.retain(|o| !removed.contains(o));
    }

    pub(crate) fn set_frozen(&mut self, names: &HashSet<String>) {
        for entry in &mut self.entries {
            if names.contains(&entry.name) {
                entry.frozen = true;
            }
        }
    }
}
