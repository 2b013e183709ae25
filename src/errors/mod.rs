use thiserror::Error;
mod ops;
pub use self::ops::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    // 张量二元运算
    #[error(
        "形状不一致，故无法{operator}：第一个张量的形状为{tensor1_shape:?}，第二个张量的形状为{tensor2_shape:?}"
    )]
    OperatorError {
        operator: Operator,
        tensor1_shape: Vec<usize>,
        tensor2_shape: Vec<usize>,
    },
    #[error("数据长度{got}与形状{shape:?}所需的元素个数{expected}不一致")]
    DataLengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },
    #[error("无法将形状{from:?}的张量重塑为形状{to:?}")]
    ReshapeMismatch { from: Vec<usize>, to: Vec<usize> },
    #[error("维度{axis}须{operator}{threshold}")]
    AxisOutOfRange {
        axis: usize,
        operator: ComparisonOperator,
        threshold: usize,
    },
    #[error("张量列表为空")]
    EmptyList,
    #[error("张量形状不兼容")]
    IncompatibleShape,
    #[error("维度置换须是[0, <张量阶数>)范围内且不重复的排列")]
    PermuteNeedUniqueAndInRange,
}
