/*
 * @Date         : 2026-02-05
 * @Description  : 下采样（池化）层，无参数，不填充
 */

use super::convolution::{as_image, output_size};
use crate::nn::nodes::{BackwardContext, Backprop, ForwardContext, ParamView, TraitNode, input_at};
use crate::nn::{GraphError, InputType, ShapeKind};
use crate::tensor::Tensor;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolingType {
    #[default]
    Max,
    Avg,
}

#[derive(Debug, Clone)]
pub(crate) struct Subsampling {
    kernel: [usize; 2],
    stride: [usize; 2],
    pooling: PoolingType,
}

impl Subsampling {
    pub(crate) fn new(
        kernel: [usize; 2],
        stride: [usize; 2],
        pooling: PoolingType,
    ) -> Result<Self, GraphError> {
        if kernel.contains(&0) || stride.contains(&0) {
            return Err(GraphError::Configuration(format!(
                "池化核{kernel:?}与步长{stride:?}必须大于0"
            )));
        }
        Ok(Self {
            kernel,
            stride,
            pooling,
        })
    }

    /// 窗口(i, j)内最大值的位置；并列时取扫描顺序中的第一个
    fn argmax(
        &self,
        x: &ndarray::ArrayView4<'_, f32>,
        n: usize,
        c: usize,
        i: usize,
        j: usize,
    ) -> (usize, usize) {
        let mut best = (i * self.stride[0], j * self.stride[1]);
        for ki in 0..self.kernel[0] {
            for kj in 0..self.kernel[1] {
                let (r, col) = (i * self.stride[0] + ki, j * self.stride[1] + kj);
                if x[[n, c, r, col]] > x[[n, c, best.0, best.1]] {
                    best = (r, col);
                }
            }
        }
        best
    }
}

impl TraitNode for Subsampling {
    fn type_name(&self) -> &str {
        "Subsampling"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::Convolutional)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let input =
            crate::nn::nodes::single_input(inputs, ShapeKind::Convolutional, "Subsampling")?;
        let InputType::Convolutional {
            channels,
            height,
            width,
        } = input
        else {
            return Err(GraphError::Configuration(format!(
                "Subsampling节点需要卷积类输入，但得到{input}"
            )));
        };
        let out_h = output_size(height, self.kernel[0], self.stride[0], 0);
        let out_w = output_size(width, self.kernel[1], self.stride[1], 0);
        match (out_h, out_w) {
            (Some(h), Some(w)) => Ok(InputType::convolutional(channels, h, w)),
            _ => Err(GraphError::Configuration(format!(
                "池化核{:?}大于输入尺寸{height}x{width}",
                self.kernel
            ))),
        }
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let x = as_image(input_at(inputs, 0)?, "Subsampling输入")?;
        let (batch, channels, in_h, in_w) = x.dim();
        let [kh, kw] = self.kernel;
        let out_h = output_size(in_h, kh, self.stride[0], 0).unwrap_or(0);
        let out_w = output_size(in_w, kw, self.stride[1], 0).unwrap_or(0);
        let area = (kh * kw) as f32;

        let out = Array4::from_shape_fn((batch, channels, out_h, out_w), |(n, c, i, j)| {
            match self.pooling {
                PoolingType::Max => {
                    let (r, col) = self.argmax(&x, n, c, i, j);
                    x[[n, c, r, col]]
                }
                PoolingType::Avg => {
                    let mut sum = 0.0;
                    for ki in 0..kh {
                        for kj in 0..kw {
                            sum += x[[n, c, i * self.stride[0] + ki, j * self.stride[1] + kj]];
                        }
                    }
                    sum / area
                }
            }
        });
        Ok(Tensor::from_array(out.into_dyn()))
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let x = as_image(input_at(ctx.inputs, 0)?, "Subsampling输入")?;
        let g = as_image(grad, "Subsampling梯度")?;
        let (batch, channels, out_h, out_w) = g.dim();
        let [kh, kw] = self.kernel;
        let area = (kh * kw) as f32;

        let mut dx = Array4::<f32>::zeros(x.raw_dim());
        for n in 0..batch {
            for c in 0..channels {
                for i in 0..out_h {
                    for j in 0..out_w {
                        let gij = g[[n, c, i, j]];
                        match self.pooling {
                            PoolingType::Max => {
                                let (r, col) = self.argmax(&x, n, c, i, j);
                                dx[[n, c, r, col]] += gij;
                            }
                            PoolingType::Avg => {
                                for ki in 0..kh {
                                    for kj in 0..kw {
                                        let (r, q) =
                                            (i * self.stride[0] + ki, j * self.stride[1] + kj);
                                        dx[[n, c, r, q]] += gij / area;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(Backprop::inputs_only(vec![Tensor::from_array(dx.into_dyn())]))
    }
}
