/*
 * @Date         : 2026-02-04
 * @Description  : 全连接层（Dense）及带损失函数的输出层（Output）
 *
 * 参数：W [n_in, n_out]，b [1, n_out]（可选）
 * forward: y = act(x·W + b)
 * backward: dz = act'(y)⊙g；dW = xᵀ·dz；db = Σ_rows dz；dx = dz·Wᵀ
 */

use crate::nn::nodes::{
    Activation, BackwardContext, Backprop, ForwardContext, ParamSpec, ParamView, TraitNode,
    as_matrix, input_at, resolve_n_in, single_input,
};
use crate::nn::{GraphError, InputType, LossFunction, ShapeKind};
use crate::tensor::Tensor;
use ndarray::{Array2, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub(crate) struct Dense {
    declared_n_in: Option<usize>,
    n_in: usize,
    n_out: usize,
    activation: Activation,
    has_bias: bool,
}

impl Dense {
    pub(crate) fn new(
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
        has_bias: bool,
    ) -> Result<Self, GraphError> {
        if n_out == 0 {
            return Err(GraphError::Configuration("n_out必须大于0".to_string()));
        }
        Ok(Self {
            declared_n_in: n_in,
            n_in: n_in.unwrap_or(0),
            n_out,
            activation,
            has_bias,
        })
    }

    pub(crate) fn infer(
        &mut self,
        input: InputType,
        type_name: &str,
    ) -> Result<(), GraphError> {
        self.n_in = resolve_n_in(self.declared_n_in, input.flat_size(), type_name)?;
        Ok(())
    }

    pub(crate) fn specs(&self) -> Vec<ParamSpec> {
        let mut specs = vec![ParamSpec::weight(
            "W",
            &[self.n_in, self.n_out],
            self.n_in,
            self.n_out,
        )];
        if self.has_bias {
            specs.push(ParamSpec::bias("b", &[1, self.n_out]));
        }
        specs
    }

    pub(crate) const fn n_out(&self) -> usize {
        self.n_out
    }

    /// 对二维输入[rows, n_in]做前向计算
    pub(crate) fn forward_matrix(
        &self,
        x: ArrayView2<'_, f32>,
        params: &ParamView<'_>,
    ) -> Result<Array2<f32>, GraphError> {
        let w = params.matrix("W")?;
        if x.ncols() != w.nrows() {
            return Err(GraphError::ComputationError(format!(
                "全连接层输入的特征数{}与权重的行数{}不一致",
                x.ncols(),
                w.nrows()
            )));
        }
        let mut z = x.dot(&w);
        if self.has_bias {
            z += &params.matrix("b")?;
        }
        let y = self.activation.forward(z.into_dyn());
        Ok(as_matrix(y.view(), "激活输出")?.to_owned())
    }

    /// 对二维输入做反向计算，返回(dx, [dW, db])
    pub(crate) fn backward_matrix(
        &self,
        x: ArrayView2<'_, f32>,
        y: ArrayView2<'_, f32>,
        grad: ArrayView2<'_, f32>,
        params: &ParamView<'_>,
    ) -> Result<(Array2<f32>, Vec<Tensor>), GraphError> {
        let w = params.matrix("W")?;
        let dz = self.activation.backward(y.into_dyn(), grad.into_dyn());
        let dz = as_matrix(dz.view(), "dz")?;
        let dw = x.t().dot(&dz);
        let dx = dz.dot(&w.t());
        let mut param_grads = vec![Tensor::from_array(dw.into_dyn())];
        if self.has_bias {
            let db = dz.sum_axis(Axis(0)).insert_axis(Axis(0));
            param_grads.push(Tensor::from_array(db.into_dyn()));
        }
        Ok((dx, param_grads))
    }
}

impl TraitNode for Dense {
    fn type_name(&self) -> &str {
        "Dense"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::FeedForward)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let input = single_input(inputs, ShapeKind::FeedForward, "Dense")?;
        self.infer(input, "Dense")?;
        Ok(InputType::feed_forward(self.n_out))
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        self.specs()
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let x = as_matrix(input_at(inputs, 0)?.view(), "Dense输入")?;
        let y = self.forward_matrix(x, params)?;
        Ok(Tensor::from_array(y.into_dyn()))
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let x = as_matrix(input_at(ctx.inputs, 0)?.view(), "Dense输入")?;
        let y = as_matrix(ctx.output.view(), "Dense输出")?;
        let g = as_matrix(grad.view(), "Dense梯度")?;
        let (dx, param_grads) = self.backward_matrix(x, y, g, params)?;
        Ok(Backprop {
            input_grads: vec![Tensor::from_array(dx.into_dyn())],
            param_grads,
        })
    }
}

/// 输出层：计算与全连接层相同，额外携带损失函数。
/// 没有损失函数的输出层只能通过外部注入误差（`backprop_gradient`）训练
#[derive(Debug, Clone)]
pub(crate) struct OutputLayer {
    dense: Dense,
    loss: Option<LossFunction>,
}

impl OutputLayer {
    pub(crate) fn new(
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
        loss: Option<LossFunction>,
    ) -> Result<Self, GraphError> {
        Ok(Self {
            dense: Dense::new(n_in, n_out, activation, true)?,
            loss,
        })
    }
}

impl TraitNode for OutputLayer {
    fn type_name(&self) -> &str {
        "Output"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::FeedForward)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let input = single_input(inputs, ShapeKind::FeedForward, "Output")?;
        self.dense.infer(input, "Output")?;
        Ok(InputType::feed_forward(self.dense.n_out()))
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        self.dense.specs()
    }

    fn loss(&self) -> Option<LossFunction> {
        self.loss
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        self.dense.forward(inputs, params, ctx)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        self.dense.backward(grad, params, ctx)
    }
}
