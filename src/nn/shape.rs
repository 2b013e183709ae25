/*
 * @Date         : 2026-02-04
 * @Description  : 节点输入/输出的形状类别（ShapeKind）与带具体尺寸的输入类型（InputType）
 *
 * 各类别对应的张量布局：
 * - FeedForward:   [batch, size]
 * - Recurrent:     [batch, size, time]
 * - Convolutional: [batch, channels, height, width]
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// 形状类别：决定生产者与消费者之间是否需要插入适配器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    FeedForward,
    Recurrent,
    Convolutional,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FeedForward => "前馈",
            Self::Recurrent => "循环",
            Self::Convolutional => "卷积",
        };
        write!(f, "{s}")
    }
}

/// 带具体尺寸的输入（输出）类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    FeedForward {
        size: usize,
    },
    Recurrent {
        size: usize,
    },
    Convolutional {
        channels: usize,
        height: usize,
        width: usize,
    },
    /// 展平后的图像数据：布局为[batch, channels*height*width]，属于前馈类别，但保留了图像尺寸，
    /// 因此可以被还原为卷积输入
    ConvolutionalFlat {
        channels: usize,
        height: usize,
        width: usize,
    },
}

impl InputType {
    pub const fn feed_forward(size: usize) -> Self {
        Self::FeedForward { size }
    }

    pub const fn recurrent(size: usize) -> Self {
        Self::Recurrent { size }
    }

    pub const fn convolutional(channels: usize, height: usize, width: usize) -> Self {
        Self::Convolutional {
            channels,
            height,
            width,
        }
    }

    pub const fn convolutional_flat(channels: usize, height: usize, width: usize) -> Self {
        Self::ConvolutionalFlat {
            channels,
            height,
            width,
        }
    }

    pub const fn kind(&self) -> ShapeKind {
        match self {
            Self::FeedForward { .. } | Self::ConvolutionalFlat { .. } => ShapeKind::FeedForward,
            Self::Recurrent { .. } => ShapeKind::Recurrent,
            Self::Convolutional { .. } => ShapeKind::Convolutional,
        }
    }

    /// 单个样本（单个时间步）展平后的长度
    pub const fn flat_size(&self) -> usize {
        match self {
            Self::FeedForward { size } | Self::Recurrent { size } => *size,
            Self::Convolutional {
                channels,
                height,
                width,
            }
            | Self::ConvolutionalFlat {
                channels,
                height,
                width,
            } => *channels * *height * *width,
        }
    }

    /// 沿第1维（特征/通道维）的长度，即合并、截取等顶点操作的作用维
    pub const fn axis1_size(&self) -> usize {
        match self {
            Self::Convolutional { channels, .. } => *channels,
            _ => self.flat_size(),
        }
    }

    /// 检查一个实际张量的形状是否符合本类型（不检查batch及时间步长度）
    pub fn matches_shape(&self, shape: &[usize]) -> bool {
        match self {
            Self::FeedForward { .. } | Self::ConvolutionalFlat { .. } => {
                shape.len() == 2 && shape[1] == self.flat_size()
            }
            Self::Recurrent { size } => shape.len() == 3 && shape[1] == *size,
            Self::Convolutional {
                channels,
                height,
                width,
            } => shape.len() == 4 && shape[1..] == [*channels, *height, *width],
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeedForward { size } => write!(f, "FeedForward({size})"),
            Self::Recurrent { size } => write!(f, "Recurrent({size})"),
            Self::Convolutional {
                channels,
                height,
                width,
            } => write!(f, "Convolutional({channels}x{height}x{width})"),
            Self::ConvolutionalFlat {
                channels,
                height,
                width,
            } => write!(f, "ConvolutionalFlat({channels}x{height}x{width})"),
        }
    }
}
