/*
 * @Date         : 2026-02-05
 * @Description  : 不含参数的图顶点：合并（Merge）、截取（Subset）、逐元素运算（ElementWise）
 *
 * 三者都沿第1维（前馈的特征维、循环的特征维、卷积的通道维）工作，且从不被插入适配器：
 * 所有输入须属于同一形状类别。
 */

use crate::nn::nodes::{BackwardContext, Backprop, ForwardContext, ParamView, TraitNode, input_at};
use crate::nn::{GraphError, InputType, MaskPolicy, ShapeKind};
use crate::tensor::Tensor;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

/// 所有输入须同属一个形状类别，返回该类别
fn common_kind(inputs: &[InputType], type_name: &str) -> Result<ShapeKind, GraphError> {
    let first = inputs.first().ok_or_else(|| {
        GraphError::Configuration(format!("{type_name}节点至少需要1个输入"))
    })?;
    if let Some(other) = inputs.iter().find(|t| t.kind() != first.kind()) {
        return Err(GraphError::Configuration(format!(
            "{type_name}节点的输入须同属一个形状类别，但同时得到{first}和{other}"
        )));
    }
    Ok(first.kind())
}

// ========== Merge ==========

/// 沿第1维拼接所有输入
#[derive(Debug, Clone)]
pub(crate) struct Merge;

impl TraitNode for Merge {
    fn type_name(&self) -> &str {
        "Merge"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        None
    }

    fn accepts_multiple_inputs(&self) -> bool {
        true
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let kind = common_kind(inputs, "Merge")?;
        let total: usize = inputs.iter().map(InputType::axis1_size).sum();
        match kind {
            ShapeKind::FeedForward => Ok(InputType::feed_forward(total)),
            ShapeKind::Recurrent => Ok(InputType::recurrent(total)),
            ShapeKind::Convolutional => {
                let mut dims = inputs.iter().map(|t| match t {
                    InputType::Convolutional { height, width, .. } => (*height, *width),
                    _ => (0, 0),
                });
                let (height, width) = dims.next().unwrap_or((0, 0));
                if dims.any(|hw| hw != (height, width)) {
                    return Err(GraphError::Configuration(
                        "Merge节点的卷积类输入须有相同的高和宽".to_string(),
                    ));
                }
                Ok(InputType::convolutional(total, height, width))
            }
        }
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::And
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        Ok(Tensor::concat(inputs, 1)?)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let mut start = 0;
        let mut input_grads = Vec::with_capacity(ctx.inputs.len());
        for input in ctx.inputs {
            let len = input.shape()[1];
            input_grads.push(grad.narrow(1, start, len)?);
            start += len;
        }
        Ok(Backprop::inputs_only(input_grads))
    }
}

// ========== Subset ==========

/// 截取第1维上[from, to]（闭区间）的部分
#[derive(Debug, Clone)]
pub(crate) struct Subset {
    from: usize,
    to: usize,
}

impl Subset {
    pub(crate) fn new(from: usize, to: usize) -> Result<Self, GraphError> {
        if to < from {
            return Err(GraphError::Configuration(format!(
                "Subset的区间无效：from={from} > to={to}"
            )));
        }
        Ok(Self { from, to })
    }

    const fn len(&self) -> usize {
        self.to - self.from + 1
    }
}

impl TraitNode for Subset {
    fn type_name(&self) -> &str {
        "Subset"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        None
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let [input] = inputs else {
            return Err(GraphError::Configuration(format!(
                "Subset节点只需要1个输入，但得到{}个",
                inputs.len()
            )));
        };
        if self.to >= input.axis1_size() {
            return Err(GraphError::Configuration(format!(
                "Subset的区间[{}, {}]超出了输入{input}的范围",
                self.from, self.to
            )));
        }
        let len = self.len();
        Ok(match *input {
            InputType::FeedForward { .. } | InputType::ConvolutionalFlat { .. } => {
                InputType::feed_forward(len)
            }
            InputType::Recurrent { .. } => InputType::recurrent(len),
            InputType::Convolutional { height, width, .. } => {
                InputType::convolutional(len, height, width)
            }
        })
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        Ok(input_at(inputs, 0)?.narrow(1, self.from, self.len())?)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let input = input_at(ctx.inputs, 0)?;
        let mut dx = ArrayD::<f32>::zeros(IxDyn(input.shape()));
        dx.slice_axis_mut(Axis(1), Slice::from(self.from..self.to + 1))
            .assign(&grad.view());
        Ok(Backprop::inputs_only(vec![Tensor::from_array(dx)]))
    }
}

// ========== ElementWise ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementWiseOp {
    Add,
    Subtract,
    Product,
}

/// 对形状相同的输入逐元素运算
#[derive(Debug, Clone)]
pub(crate) struct ElementWise {
    op: ElementWiseOp,
}

impl ElementWise {
    pub(crate) const fn new(op: ElementWiseOp) -> Self {
        Self { op }
    }
}

impl TraitNode for ElementWise {
    fn type_name(&self) -> &str {
        "ElementWise"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        None
    }

    fn accepts_multiple_inputs(&self) -> bool {
        true
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        common_kind(inputs, "ElementWise")?;
        if self.op == ElementWiseOp::Subtract && inputs.len() != 2 {
            return Err(GraphError::Configuration(format!(
                "逐元素相减需要恰好2个输入，但得到{}个",
                inputs.len()
            )));
        }
        let first = inputs[0];
        if let Some(other) = inputs.iter().find(|t| t.flat_size() != first.flat_size()) {
            return Err(GraphError::Configuration(format!(
                "逐元素运算的输入尺寸须一致，但同时得到{first}和{other}"
            )));
        }
        Ok(first)
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::And
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let first = input_at(inputs, 0)?;
        if let Some(other) = inputs.iter().find(|t| !t.is_same_shape(first)) {
            return Err(GraphError::ComputationError(format!(
                "逐元素运算的输入形状不一致：{:?}与{:?}",
                first.shape(),
                other.shape()
            )));
        }
        let rest = inputs[1..].iter();
        let out = match self.op {
            ElementWiseOp::Add => rest.fold(first.clone(), |acc, t| acc + *t),
            ElementWiseOp::Subtract => rest.fold(first.clone(), |acc, t| acc - *t),
            ElementWiseOp::Product => rest.fold(first.clone(), |acc, t| &acc * *t),
        };
        Ok(out)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let input_grads = match self.op {
            ElementWiseOp::Add => vec![grad.clone(); ctx.inputs.len()],
            ElementWiseOp::Subtract => vec![grad.clone(), -1.0 * grad],
            ElementWiseOp::Product => (0..ctx.inputs.len())
                .map(|i| {
                    ctx.inputs
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .fold(grad.clone(), |acc, (_, t)| &acc * *t)
                })
                .collect(),
        };
        Ok(Backprop::inputs_only(input_grads))
    }
}
