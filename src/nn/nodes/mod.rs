/*
 * @Date         : 2026-02-04
 * @Description  : 计算图节点：统一的节点契约（TraitNode）及各内置节点类型
 *
 * 节点本身不持有参数：参数与梯度都存放在图的扁平缓冲里，执行器每次调用时
 * 通过`ParamView`把本节点对应的子区间（按`param_specs`声明顺序）借给节点。
 */

mod activation;
mod convolution;
mod custom;
mod dense;
mod input;
mod preprocessor;
mod recurrent;
mod subsampling;
mod vertex;

pub use activation::Activation;
pub use custom::{CustomLayer, NodeFactory, NodeRegistry};
pub(crate) use custom::CustomNode;
pub(crate) use convolution::Convolution;
pub(crate) use dense::{Dense, OutputLayer};
pub(crate) use input::Input;
pub use preprocessor::Preprocessor;
pub(crate) use recurrent::{RnnOutput, SimpleRnn};
pub use subsampling::PoolingType;
pub(crate) use subsampling::Subsampling;
pub use vertex::ElementWiseOp;
pub(crate) use vertex::{ElementWise, Merge, Subset};

use crate::nn::descriptor::NodeTypeDescriptor;
use crate::nn::{GraphError, InputType, LossFunction, MaskPolicy, ShapeKind};
use crate::tensor::Tensor;
use enum_dispatch::enum_dispatch;
use ndarray::{ArrayView2, ArrayViewD, Ix2, IxDyn};

#[enum_dispatch]
#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Input(Input),
    Dense(Dense),
    Output(OutputLayer),
    SimpleRnn(SimpleRnn),
    RnnOutput(RnnOutput),
    Convolution(Convolution),
    Subsampling(Subsampling),
    Merge(Merge),
    Subset(Subset),
    ElementWise(ElementWise),
    Adapter(Preprocessor),
    Custom(CustomNode),
}

/// 节点契约：图执行器只通过这组方法驱动节点
#[enum_dispatch(NodeType)]
pub trait TraitNode {
    /// 节点类型名（用于日志与错误信息）
    fn type_name(&self) -> &str;

    /// 期望的输入形状类别；`None`表示不限类别（但所有输入须同属一类），这类节点从不被插入适配器
    fn input_kind(&self) -> Option<ShapeKind>;

    /// 是否允许多条输入边（合并、逐元素运算等顶点）
    fn accepts_multiple_inputs(&self) -> bool {
        false
    }

    /// 由（已适配的）输入类型推断输出类型；未声明输入尺寸的节点在此记下推断出的尺寸
    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError>;

    /// 按固定顺序声明的可学习参数
    fn param_specs(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn num_params(&self) -> usize {
        self.param_specs().iter().map(ParamSpec::len).sum()
    }

    fn is_learnable(&self) -> bool {
        self.num_params() > 0
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::PassThrough
    }

    /// 作为输出节点时使用的损失函数
    fn loss(&self) -> Option<LossFunction> {
        None
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError>;

    /// `grad`为损失对本节点输出的梯度（已是所有下游消费者贡献之和）
    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError>;
}

impl NodeType {
    pub(crate) const fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    pub(crate) fn from_descriptor(
        desc: &NodeTypeDescriptor,
        registry: &NodeRegistry,
    ) -> Result<Self, GraphError> {
        let node = match desc {
            NodeTypeDescriptor::Input { input_type } => Input::new(*input_type).into(),
            NodeTypeDescriptor::Dense {
                n_in,
                n_out,
                activation,
                has_bias,
            } => Dense::new(*n_in, *n_out, *activation, *has_bias)?.into(),
            NodeTypeDescriptor::Output {
                n_in,
                n_out,
                activation,
                loss,
            } => OutputLayer::new(*n_in, *n_out, *activation, *loss)?.into(),
            NodeTypeDescriptor::SimpleRnn {
                n_in,
                n_out,
                activation,
            } => SimpleRnn::new(*n_in, *n_out, *activation)?.into(),
            NodeTypeDescriptor::RnnOutput {
                n_in,
                n_out,
                activation,
                loss,
            } => RnnOutput::new(*n_in, *n_out, *activation, *loss)?.into(),
            NodeTypeDescriptor::Convolution {
                n_in,
                n_out,
                kernel,
                stride,
                padding,
                activation,
            } => Convolution::new(*n_in, *n_out, *kernel, *stride, *padding, *activation)?.into(),
            NodeTypeDescriptor::Subsampling {
                kernel,
                stride,
                pooling,
            } => Subsampling::new(*kernel, *stride, *pooling)?.into(),
            NodeTypeDescriptor::Merge => Merge.into(),
            NodeTypeDescriptor::Subset { from, to } => Subset::new(*from, *to)?.into(),
            NodeTypeDescriptor::ElementWise { op } => ElementWise::new(*op).into(),
            NodeTypeDescriptor::Custom { type_name, config } => {
                CustomNode::new(registry.create(type_name, config)?).into()
            }
        };
        Ok(node)
    }
}

// ========== 参数声明与视图 ==========

/// 参数的初始化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamInit {
    /// Xavier均匀分布：U(-a, a)，a = sqrt(6 / (fan_in + fan_out))
    Xavier { fan_in: usize, fan_out: usize },
    Zeros,
}

/// 单个可学习参数（如权重矩阵、偏置向量）的声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub init: ParamInit,
}

impl ParamSpec {
    pub fn weight(name: &str, shape: &[usize], fan_in: usize, fan_out: usize) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            init: ParamInit::Xavier { fan_in, fan_out },
        }
    }

    pub fn bias(name: &str, shape: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            init: ParamInit::Zeros,
        }
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 参数在扁平缓冲中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParamSlot {
    pub(crate) name: String,
    pub(crate) shape: Vec<usize>,
    pub(crate) offset: usize,
}

impl ParamSlot {
    pub(crate) fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub(crate) fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// 某个节点的参数视图：直接借用扁平参数缓冲，不做拷贝
#[derive(Debug, Clone, Copy)]
pub struct ParamView<'a> {
    slots: &'a [ParamSlot],
    buffer: &'a [f32],
}

impl<'a> ParamView<'a> {
    pub(crate) const fn new(slots: &'a [ParamSlot], buffer: &'a [f32]) -> Self {
        Self { slots, buffer }
    }

    /// 没有任何参数的视图
    pub const fn empty() -> ParamView<'static> {
        ParamView {
            slots: &[],
            buffer: &[],
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    pub fn get(&self, name: &str) -> Result<ArrayViewD<'a, f32>, GraphError> {
        let slot = self
            .slots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| GraphError::InvalidOperation(format!("节点没有名为`{name}`的参数")))?;
        ArrayViewD::from_shape(IxDyn(&slot.shape), &self.buffer[slot.range()])
            .map_err(|e| GraphError::ComputationError(format!("参数`{name}`视图构建失败：{e}")))
    }

    pub fn matrix(&self, name: &str) -> Result<ArrayView2<'a, f32>, GraphError> {
        as_matrix(self.get(name)?, name)
    }
}

// ========== 执行上下文 ==========

/// 前向传播时传给节点的上下文
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext<'a> {
    pub training: bool,
    /// 本轮前向传播的样本数（时间步被折叠进batch维时，用于还原）
    pub batch_size: usize,
    /// 合并后的输入掩码
    pub mask: Option<&'a Tensor>,
}

/// 反向传播时传给节点的上下文：前向时的输入、输出与掩码
#[derive(Debug, Clone, Copy)]
pub struct BackwardContext<'a> {
    pub inputs: &'a [&'a Tensor],
    pub output: &'a Tensor,
    pub mask: Option<&'a Tensor>,
    pub batch_size: usize,
}

/// 节点反向传播的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Backprop {
    /// 对每条输入边（按输入顺序）的梯度，形状与对应输入一致
    pub input_grads: Vec<Tensor>,
    /// 对每个参数（按`param_specs`顺序）的梯度，形状与对应参数一致
    pub param_grads: Vec<Tensor>,
}

impl Backprop {
    pub const fn inputs_only(input_grads: Vec<Tensor>) -> Self {
        Self {
            input_grads,
            param_grads: Vec::new(),
        }
    }
}

// ========== 内部工具 ==========

pub(crate) fn as_matrix<'a>(
    view: ArrayViewD<'a, f32>,
    what: &str,
) -> Result<ArrayView2<'a, f32>, GraphError> {
    let shape = view.shape().to_vec();
    view.into_dimensionality::<Ix2>().map_err(|_| {
        GraphError::ComputationError(format!("`{what}`须为二维矩阵，但形状为{shape:?}"))
    })
}

/// 检查单输入节点的输入个数与类别
pub(crate) fn single_input(
    inputs: &[InputType],
    kind: ShapeKind,
    type_name: &str,
) -> Result<InputType, GraphError> {
    match inputs {
        [input] if input.kind() == kind => Ok(*input),
        [input] => Err(GraphError::Configuration(format!(
            "{type_name}节点需要{kind}类输入，但得到{input}"
        ))),
        _ => Err(GraphError::Configuration(format!(
            "{type_name}节点只需要1个输入，但得到{}个",
            inputs.len()
        ))),
    }
}

/// 声明的输入尺寸与推断出的不一致时报错
pub(crate) fn resolve_n_in(
    declared: Option<usize>,
    inferred: usize,
    type_name: &str,
) -> Result<usize, GraphError> {
    match declared {
        Some(n_in) if n_in != inferred => Err(GraphError::Configuration(format!(
            "{type_name}节点声明的n_in={n_in}与由输入推断出的{inferred}不一致"
        ))),
        _ => Ok(inferred),
    }
}

pub(crate) fn input_at<'a>(inputs: &[&'a Tensor], index: usize) -> Result<&'a Tensor, GraphError> {
    inputs.get(index).copied().ok_or_else(|| {
        GraphError::ComputationError(format!("缺少第{index}个输入，实际只有{}个", inputs.len()))
    })
}
