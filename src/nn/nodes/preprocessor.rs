/*
 * @Date         : 2026-02-05
 * @Description  : 形状适配器（预处理器）：由构图时的适配器解析自动插入在形状类别不同的生产者与消费者之间，
 *                 不含参数。时间相关的适配器把时间维折叠进batch维（[b, n, T] <-> [b*T, n]）。
 */

use crate::nn::nodes::{BackwardContext, Backprop, ForwardContext, ParamView, TraitNode, input_at};
use crate::nn::{GraphError, InputType, MaskPolicy, ShapeKind};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preprocessor {
    /// [b, c, h, w] -> [b, c*h*w]
    CnnToFeedForward {
        channels: usize,
        height: usize,
        width: usize,
    },
    /// [b, c*h*w] -> [b, c, h, w]，只接受展平后的图像数据
    FeedForwardToCnn {
        channels: usize,
        height: usize,
        width: usize,
    },
    /// [b, n, T] -> [b*T, n]
    RnnToFeedForward,
    /// [b*T, n] -> [b, n, T]
    FeedForwardToRnn,
    /// [b*T, c, h, w] -> [b, c*h*w, T]
    CnnToRnn {
        channels: usize,
        height: usize,
        width: usize,
    },
}

impl fmt::Display for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CnnToFeedForward {
                channels,
                height,
                width,
            } => write!(f, "CnnToFeedForward({channels}x{height}x{width})"),
            Self::FeedForwardToCnn {
                channels,
                height,
                width,
            } => write!(f, "FeedForwardToCnn({channels}x{height}x{width})"),
            Self::RnnToFeedForward => write!(f, "RnnToFeedForward"),
            Self::FeedForwardToRnn => write!(f, "FeedForwardToRnn"),
            Self::CnnToRnn {
                channels,
                height,
                width,
            } => write!(f, "CnnToRnn({channels}x{height}x{width})"),
        }
    }
}

impl Preprocessor {
    /// 为“`from`类型的输出接入期望`to`类别输入的消费者”挑选适配器。
    /// 类别相同时返回`Ok(None)`（从不在兼容的类别之间插入适配器），不存在适配路径时返回`Err(())`
    pub(crate) fn resolve(from: InputType, to: ShapeKind) -> Result<Option<Self>, ()> {
        if from.kind() == to {
            return Ok(None);
        }
        let adapter = match (from, to) {
            (
                InputType::Convolutional {
                    channels,
                    height,
                    width,
                },
                ShapeKind::FeedForward,
            ) => Self::CnnToFeedForward {
                channels,
                height,
                width,
            },
            (
                InputType::ConvolutionalFlat {
                    channels,
                    height,
                    width,
                },
                ShapeKind::Convolutional,
            ) => Self::FeedForwardToCnn {
                channels,
                height,
                width,
            },
            (InputType::Recurrent { .. }, ShapeKind::FeedForward) => Self::RnnToFeedForward,
            (InputType::FeedForward { .. }, ShapeKind::Recurrent) => Self::FeedForwardToRnn,
            (
                InputType::Convolutional {
                    channels,
                    height,
                    width,
                },
                ShapeKind::Recurrent,
            ) => Self::CnnToRnn {
                channels,
                height,
                width,
            },
            _ => return Err(()),
        };
        Ok(Some(adapter))
    }

    const fn expected_kind(&self) -> ShapeKind {
        match self {
            Self::CnnToFeedForward { .. } | Self::CnnToRnn { .. } => ShapeKind::Convolutional,
            Self::FeedForwardToCnn { .. } | Self::FeedForwardToRnn => ShapeKind::FeedForward,
            Self::RnnToFeedForward => ShapeKind::Recurrent,
        }
    }
}

impl TraitNode for Preprocessor {
    fn type_name(&self) -> &str {
        match self {
            Self::CnnToFeedForward { .. } => "CnnToFeedForward",
            Self::FeedForwardToCnn { .. } => "FeedForwardToCnn",
            Self::RnnToFeedForward => "RnnToFeedForward",
            Self::FeedForwardToRnn => "FeedForwardToRnn",
            Self::CnnToRnn { .. } => "CnnToRnn",
        }
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(self.expected_kind())
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        let [input] = inputs else {
            return Err(GraphError::Configuration(format!(
                "适配器{self}只需要1个输入"
            )));
        };
        let output = match *self {
            Self::CnnToFeedForward { .. } => InputType::feed_forward(input.flat_size()),
            Self::FeedForwardToCnn {
                channels,
                height,
                width,
            } => {
                if input.flat_size() != channels * height * width {
                    return Err(GraphError::Configuration(format!(
                        "适配器{self}的输入长度{}与图像尺寸不符",
                        input.flat_size()
                    )));
                }
                InputType::convolutional(channels, height, width)
            }
            Self::RnnToFeedForward => InputType::feed_forward(input.flat_size()),
            Self::FeedForwardToRnn => InputType::recurrent(input.flat_size()),
            Self::CnnToRnn { .. } => InputType::recurrent(input.flat_size()),
        };
        Ok(output)
    }

    fn mask_policy(&self) -> MaskPolicy {
        match self {
            Self::RnnToFeedForward => MaskPolicy::FlattenTime,
            Self::FeedForwardToRnn | Self::CnnToRnn { .. } => MaskPolicy::UnflattenTime,
            Self::CnnToFeedForward { .. } | Self::FeedForwardToCnn { .. } => {
                MaskPolicy::PassThrough
            }
        }
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let input = input_at(inputs, 0)?;
        let batch = input.shape().first().copied().unwrap_or(0);
        match *self {
            Self::CnnToFeedForward { .. } => {
                Ok(input.reshape(&[batch, input.size() / batch.max(1)])?)
            }
            Self::FeedForwardToCnn {
                channels,
                height,
                width,
            } => Ok(input.reshape(&[batch, channels, height, width])?),
            Self::RnnToFeedForward => rnn_to_ff(input),
            Self::FeedForwardToRnn => ff_to_rnn(input, ctx.batch_size),
            Self::CnnToRnn {
                channels,
                height,
                width,
            } => {
                let flat = input.reshape(&[batch, channels * height * width])?;
                ff_to_rnn(&flat, ctx.batch_size)
            }
        }
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let input = input_at(ctx.inputs, 0)?;
        let input_grad = match *self {
            Self::CnnToFeedForward { .. }
            | Self::FeedForwardToCnn { .. }
            | Self::CnnToRnn { .. } => {
                let flat = match *self {
                    Self::CnnToRnn { .. } => rnn_to_ff(grad)?,
                    _ => grad.clone(),
                };
                flat.reshape(input.shape())?
            }
            Self::RnnToFeedForward => {
                let batch = input.shape().first().copied().unwrap_or(0);
                ff_to_rnn(grad, batch)?
            }
            Self::FeedForwardToRnn => rnn_to_ff(grad)?,
        };
        Ok(Backprop::inputs_only(vec![input_grad]))
    }
}

/// [b, n, T] -> [b*T, n]（行序为 b*T + t）
pub(crate) fn rnn_to_ff(t: &Tensor) -> Result<Tensor, GraphError> {
    let [batch, size, time] = t.shape() else {
        return Err(GraphError::ComputationError(format!(
            "时间折叠要求[batch, size, time]三维张量，但得到{:?}",
            t.shape()
        )));
    };
    let (batch, size, time) = (*batch, *size, *time);
    Ok(t.permute(&[0, 2, 1])?.reshape(&[batch * time, size])?)
}

/// [b*T, n] -> [b, n, T]
pub(crate) fn ff_to_rnn(t: &Tensor, batch: usize) -> Result<Tensor, GraphError> {
    let [rows, size] = t.shape() else {
        return Err(GraphError::ComputationError(format!(
            "还原时间维要求[batch*time, size]二维张量，但得到{:?}",
            t.shape()
        )));
    };
    if batch == 0 || rows % batch != 0 {
        return Err(GraphError::ComputationError(format!(
            "行数{rows}无法按batch大小{batch}还原时间维"
        )));
    }
    let (time, size) = (rows / batch, *size);
    Ok(t.reshape(&[batch, time, size])?.permute(&[0, 2, 1])?)
}
