/*
 * @Date         : 2026-02-05
 * @Description  : 循环层：简单RNN（SimpleRnn）与逐时间步的输出层（RnnOutput）
 *
 * 输入/输出布局均为[batch, size, time]，掩码布局为[batch, time]。
 */

use super::dense::Dense;
use super::preprocessor::{ff_to_rnn, rnn_to_ff};
use crate::nn::nodes::{
    Activation, BackwardContext, Backprop, ForwardContext, ParamSpec, ParamView, TraitNode,
    as_matrix, input_at, resolve_n_in, single_input,
};
use crate::nn::{GraphError, InputType, LossFunction, ShapeKind};
use crate::tensor::Tensor;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Ix2, Ix3};

fn as_sequence<'a>(t: &'a Tensor, what: &str) -> Result<ArrayView3<'a, f32>, GraphError> {
    t.view().into_dimensionality::<Ix3>().map_err(|_| {
        GraphError::ComputationError(format!(
            "`{what}`须为[batch, size, time]三维张量，但形状为{:?}",
            t.shape()
        ))
    })
}

fn sequence_mask<'a>(
    mask: Option<&'a Tensor>,
    batch: usize,
    time: usize,
) -> Result<Option<ArrayView2<'a, f32>>, GraphError> {
    let Some(mask) = mask else {
        return Ok(None);
    };
    if mask.shape() != [batch, time] {
        return Err(GraphError::ComputationError(format!(
            "循环层的掩码须为[{batch}, {time}]，但得到{:?}",
            mask.shape()
        )));
    }
    Ok(Some(as_matrix(mask.view(), "掩码")?))
}

/// 简单循环层：h_t = act(x_t·W + h_{t-1}·RW + b)；被掩码的时间步输出为0，且不向后续时间步传递状态
#[derive(Debug, Clone)]
pub(crate) struct SimpleRnn {
    declared_n_in: Option<usize>,
    n_in: usize,
    n_out: usize,
    activation: Activation,
}

impl SimpleRnn {
    pub(crate) fn new(
        n_in: Option<usize>,
        n_out: usize,
        activation: Activation,
    ) -> Result<Self, GraphError> {
        if n_out == 0 {
            return Err(GraphError::Configuration("n_out必须大于0".to_string()));
        }
        Ok(Self {
            declared_n_in: n_in,
            n_in: n_in.unwrap_or(0),
            n_out,
            activation,
        })
    }

    fn step_activation(&self, z: Array2<f32>) -> Result<Array2<f32>, GraphError> {
        self.activation
            .forward(z.into_dyn())
            .into_dimensionality::<Ix2>()
            .map_err(|e| GraphError::ComputationError(format!("SimpleRnn激活输出维度异常：{e}")))
    }
}

impl TraitNode for SimpleRnn {
    fn type_name(&self) -> &str {
        "SimpleRnn"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::Recurrent)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let input = single_input(inputs, ShapeKind::Recurrent, "SimpleRnn")?;
        self.n_in = resolve_n_in(self.declared_n_in, input.flat_size(), "SimpleRnn")?;
        Ok(InputType::recurrent(self.n_out))
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::weight("W", &[self.n_in, self.n_out], self.n_in, self.n_out),
            ParamSpec::weight("RW", &[self.n_out, self.n_out], self.n_out, self.n_out),
            ParamSpec::bias("b", &[1, self.n_out]),
        ]
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let x = as_sequence(input_at(inputs, 0)?, "SimpleRnn输入")?;
        let (batch, n_in, time) = x.dim();
        if n_in != self.n_in {
            return Err(GraphError::ComputationError(format!(
                "SimpleRnn输入的特征数{n_in}与n_in={}不一致",
                self.n_in
            )));
        }
        let w = params.matrix("W")?;
        let rw = params.matrix("RW")?;
        let b = params.matrix("b")?;
        let mask = sequence_mask(ctx.mask, batch, time)?;

        let mut out = Array3::<f32>::zeros((batch, self.n_out, time));
        let mut h_prev = Array2::<f32>::zeros((batch, self.n_out));
        for t in 0..time {
            let mut z = x.index_axis(Axis(2), t).dot(&w) + h_prev.dot(&rw);
            z += &b;
            let mut h = self.step_activation(z)?;
            if let Some(m) = &mask {
                h *= &m.column(t).insert_axis(Axis(1));
            }
            out.index_axis_mut(Axis(2), t).assign(&h);
            h_prev = h;
        }
        Ok(Tensor::from_array(out.into_dyn()))
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let x = as_sequence(input_at(ctx.inputs, 0)?, "SimpleRnn输入")?;
        let out = as_sequence(ctx.output, "SimpleRnn输出")?;
        let dout = as_sequence(grad, "SimpleRnn梯度")?;
        let (batch, n_in, time) = x.dim();
        let w = params.matrix("W")?;
        let rw = params.matrix("RW")?;
        let mask = sequence_mask(ctx.mask, batch, time)?;

        let mut dw = Array2::<f32>::zeros((n_in, self.n_out));
        let mut drw = Array2::<f32>::zeros((self.n_out, self.n_out));
        let mut db = Array2::<f32>::zeros((1, self.n_out));
        let mut dx = Array3::<f32>::zeros((batch, n_in, time));
        let mut dh_next = Array2::<f32>::zeros((batch, self.n_out));

        // 沿时间反向展开（BPTT）
        for t in (0..time).rev() {
            let h_t = out.index_axis(Axis(2), t);
            let dh = &dout.index_axis(Axis(2), t) + &dh_next;
            let dz = self.activation.backward(h_t.into_dyn(), dh.view().into_dyn());
            let mut dz = dz
                .into_dimensionality::<Ix2>()
                .map_err(|e| GraphError::ComputationError(format!("SimpleRnn梯度维度异常：{e}")))?;
            if let Some(m) = &mask {
                dz *= &m.column(t).insert_axis(Axis(1));
            }
            dw += &x.index_axis(Axis(2), t).t().dot(&dz);
            if t > 0 {
                drw += &out.index_axis(Axis(2), t - 1).t().dot(&dz);
            }
            db += &dz.sum_axis(Axis(0)).insert_axis(Axis(0));
            dx.index_axis_mut(Axis(2), t).assign(&dz.dot(&w.t()));
            dh_next = dz.dot(&rw.t());
        }

        Ok(Backprop {
            input_grads: vec![Tensor::from_array(dx.into_dyn())],
            param_grads: vec![
                Tensor::from_array(dw.into_dyn()),
                Tensor::from_array(drw.into_dyn()),
                Tensor::from_array(db.into_dyn()),
            ],
        })
    }
}

/// 逐时间步的输出层：对每个时间步做同一个全连接变换，掩码只作用于损失
#[derive(Debug, Clone)]
pub(crate) struct RnnOutput {
    dense: Dense,
    loss: Option<LossFunction>,
}

impl RnnOutput {
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

impl TraitNode for RnnOutput {
    fn type_name(&self) -> &str {
        "RnnOutput"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::Recurrent)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let input = single_input(inputs, ShapeKind::Recurrent, "RnnOutput")?;
        self.dense.infer(input, "RnnOutput")?;
        Ok(InputType::recurrent(self.dense.n_out()))
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
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let input = input_at(inputs, 0)?;
        let batch = as_sequence(input, "RnnOutput输入")?.dim().0;
        let flat = rnn_to_ff(input)?;
        let y = self
            .dense
            .forward_matrix(as_matrix(flat.view(), "RnnOutput输入")?, params)?;
        ff_to_rnn(&Tensor::from_array(y.into_dyn()), batch)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let input = input_at(ctx.inputs, 0)?;
        let batch = as_sequence(input, "RnnOutput输入")?.dim().0;
        let x = rnn_to_ff(input)?;
        let y = rnn_to_ff(ctx.output)?;
        let g = rnn_to_ff(grad)?;
        let (dx, param_grads) = self.dense.backward_matrix(
            as_matrix(x.view(), "RnnOutput输入")?,
            as_matrix(y.view(), "RnnOutput输出")?,
            as_matrix(g.view(), "RnnOutput梯度")?,
            params,
        )?;
        Ok(Backprop {
            input_grads: vec![ff_to_rnn(&Tensor::from_array(dx.into_dyn()), batch)?],
            param_grads,
        })
    }
}
