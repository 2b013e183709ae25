/*
 * @Date         : 2026-02-05
 * @Description  : 二维卷积层
 *
 * 参数：W [n_out, n_in, kh, kw]，b [1, n_out]
 * 输入/输出布局：[batch, channels, height, width]
 * 输出尺寸：out = (in + 2*padding - kernel) / stride + 1（向下取整）
 * 逐样本的计算用 Rayon 并行。
 */

use crate::nn::nodes::{
    Activation, BackwardContext, Backprop, ForwardContext, ParamSpec, ParamView, TraitNode,
    input_at, resolve_n_in, single_input,
};
use crate::nn::{GraphError, InputType, ShapeKind};
use crate::tensor::Tensor;
use ndarray::{Array4, ArrayView4, Ix4};
use rayon::prelude::*;

pub(crate) fn as_image<'a>(t: &'a Tensor, what: &str) -> Result<ArrayView4<'a, f32>, GraphError> {
    t.view().into_dimensionality::<Ix4>().map_err(|_| {
        GraphError::ComputationError(format!(
            "`{what}`须为[batch, channels, height, width]四维张量，但形状为{:?}",
            t.shape()
        ))
    })
}

/// 按核大小、步长、填充计算输出边长，核比（填充后的）输入还大时返回None
pub(crate) const fn output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    let padded = input + 2 * padding;
    if kernel == 0 || stride == 0 || kernel > padded {
        None
    } else {
        Some((padded - kernel) / stride + 1)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Convolution {
    declared_n_in: Option<usize>,
    n_in: usize,
    n_out: usize,
    kernel: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    activation: Activation,
}

impl Convolution {
    pub(crate) fn new(
        n_in: Option<usize>,
        n_out: usize,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
        activation: Activation,
    ) -> Result<Self, GraphError> {
        if n_out == 0 {
            return Err(GraphError::Configuration("n_out必须大于0".to_string()));
        }
        if kernel.contains(&0) || stride.contains(&0) {
            return Err(GraphError::Configuration(format!(
                "卷积核{kernel:?}与步长{stride:?}必须大于0"
            )));
        }
        Ok(Self {
            declared_n_in: n_in,
            n_in: n_in.unwrap_or(0),
            n_out,
            kernel,
            stride,
            padding,
            activation,
        })
    }

    /// 输入位置：输出坐标`o`、核内偏移`k`对应的（未填充）输入坐标，落在填充区时返回None
    const fn input_pos(&self, axis: usize, o: usize, k: usize, size: usize) -> Option<usize> {
        let pos = o * self.stride[axis] + k;
        if pos < self.padding[axis] || pos - self.padding[axis] >= size {
            None
        } else {
            Some(pos - self.padding[axis])
        }
    }
}

impl TraitNode for Convolution {
    fn type_name(&self) -> &str {
        "Convolution"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::Convolutional)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let input = single_input(inputs, ShapeKind::Convolutional, "Convolution")?;
        let InputType::Convolutional {
            channels,
            height,
            width,
        } = input
        else {
            return Err(GraphError::Configuration(format!(
                "Convolution节点需要卷积类输入，但得到{input}"
            )));
        };
        self.n_in = resolve_n_in(self.declared_n_in, channels, "Convolution")?;
        let out_h = output_size(height, self.kernel[0], self.stride[0], self.padding[0]);
        let out_w = output_size(width, self.kernel[1], self.stride[1], self.padding[1]);
        match (out_h, out_w) {
            (Some(h), Some(w)) => Ok(InputType::convolutional(self.n_out, h, w)),
            _ => Err(GraphError::Configuration(format!(
                "卷积核{:?}（填充{:?}）大于输入尺寸{height}x{width}",
                self.kernel, self.padding
            ))),
        }
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        let [kh, kw] = self.kernel;
        vec![
            ParamSpec::weight(
                "W",
                &[self.n_out, self.n_in, kh, kw],
                self.n_in * kh * kw,
                self.n_out * kh * kw,
            ),
            ParamSpec::bias("b", &[1, self.n_out]),
        ]
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let x = as_image(input_at(inputs, 0)?, "Convolution输入")?;
        let (batch, in_c, in_h, in_w) = x.dim();
        if in_c != self.n_in {
            return Err(GraphError::ComputationError(format!(
                "Convolution输入通道数{in_c}与n_in={}不一致",
                self.n_in
            )));
        }
        let w = params.get("W")?.into_dimensionality::<Ix4>().map_err(|e| {
            GraphError::ComputationError(format!("卷积核参数维度异常：{e}"))
        })?;
        let b = params.matrix("b")?;
        let [kh, kw] = self.kernel;
        let out_h = output_size(in_h, kh, self.stride[0], self.padding[0]).unwrap_or(0);
        let out_w = output_size(in_w, kw, self.stride[1], self.padding[1]).unwrap_or(0);
        let n_out = self.n_out;
        let this = &*self;

        // Rayon 并行计算每个 batch 样本
        let batch_results: Vec<Vec<f32>> = (0..batch)
            .into_par_iter()
            .map(|n| {
                let mut sample = vec![0.0f32; n_out * out_h * out_w];
                for o in 0..n_out {
                    for i in 0..out_h {
                        for j in 0..out_w {
                            let mut sum = b[[0, o]];
                            for c in 0..in_c {
                                for ki in 0..kh {
                                    let Some(r) = this.input_pos(0, i, ki, in_h) else {
                                        continue;
                                    };
                                    for kj in 0..kw {
                                        if let Some(col) = this.input_pos(1, j, kj, in_w) {
                                            sum += x[[n, c, r, col]] * w[[o, c, ki, kj]];
                                        }
                                    }
                                }
                            }
                            sample[(o * out_h + i) * out_w + j] = sum;
                        }
                    }
                }
                sample
            })
            .collect();

        let z = Array4::from_shape_vec(
            (batch, n_out, out_h, out_w),
            batch_results.into_iter().flatten().collect(),
        )
        .map_err(|e| GraphError::ComputationError(format!("卷积输出形状异常：{e}")))?;
        Ok(Tensor::from_array(self.activation.forward(z.into_dyn())))
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let x = as_image(input_at(ctx.inputs, 0)?, "Convolution输入")?;
        let (batch, in_c, in_h, in_w) = x.dim();
        let w = params.get("W")?.into_dimensionality::<Ix4>().map_err(|e| {
            GraphError::ComputationError(format!("卷积核参数维度异常：{e}"))
        })?;
        let dz = self
            .activation
            .backward(ctx.output.view(), grad.view())
            .into_dimensionality::<Ix4>()
            .map_err(|e| GraphError::ComputationError(format!("卷积梯度维度异常：{e}")))?;
        let (_, n_out, out_h, out_w) = dz.dim();
        let [kh, kw] = self.kernel;
        let this = &*self;

        // 每个样本各自求 dx 以及对 dW、db 的贡献，最后再求和
        let per_sample: Vec<(Vec<f32>, Array4<f32>, Vec<f32>)> = (0..batch)
            .into_par_iter()
            .map(|n| {
                let mut dx = vec![0.0f32; in_c * in_h * in_w];
                let mut dw = Array4::<f32>::zeros((n_out, in_c, kh, kw));
                let mut db = vec![0.0f32; n_out];
                for o in 0..n_out {
                    for i in 0..out_h {
                        for j in 0..out_w {
                            let g = dz[[n, o, i, j]];
                            db[o] += g;
                            for c in 0..in_c {
                                for ki in 0..kh {
                                    let Some(r) = this.input_pos(0, i, ki, in_h) else {
                                        continue;
                                    };
                                    for kj in 0..kw {
                                        if let Some(col) = this.input_pos(1, j, kj, in_w) {
                                            dw[[o, c, ki, kj]] += g * x[[n, c, r, col]];
                                            dx[(c * in_h + r) * in_w + col] +=
                                                g * w[[o, c, ki, kj]];
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                (dx, dw, db)
            })
            .collect();

        let mut dw_total = Array4::<f32>::zeros((n_out, in_c, kh, kw));
        let mut db_total = vec![0.0f32; n_out];
        let mut dx_all = Vec::with_capacity(batch * in_c * in_h * in_w);
        for (dx, dw, db) in per_sample {
            dx_all.extend(dx);
            dw_total += &dw;
            for (total, v) in db_total.iter_mut().zip(db) {
                *total += v;
            }
        }

        Ok(Backprop {
            input_grads: vec![Tensor::try_new(&dx_all, &[batch, in_c, in_h, in_w])?],
            param_grads: vec![
                Tensor::from_array(dw_total.into_dyn()),
                Tensor::try_new(&db_total, &[1, n_out])?,
            ],
        })
    }
}
