/*
 * @Date         : 2026-02-04
 * @Description  : Graph 模块的错误类型
 */

use crate::errors::TensorError;
use crate::nn::{InputType, ShapeKind};
use thiserror::Error;

/// Graph 操作错误类型
///
/// 前五类均表示模型结构本身无效，构建/调用时立即返回给调用方，内部从不重试；
/// 消息中总是带上出问题的节点（边）名，便于定位配置。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("配置错误：{0}")]
    Configuration(String),
    #[error(
        "节点`{producer}`的输出类型{from}无法接入节点`{consumer}`（期望{to}输入），且不存在可用的形状适配器"
    )]
    IncompatibleShape {
        producer: String,
        consumer: String,
        from: InputType,
        to: ShapeKind,
    },
    #[error("图中存在环，以下节点无法排出求值顺序：{unresolved:?}")]
    CyclicGraph { unresolved: Vec<String> },
    #[error("参数个数不匹配：期望{expected}个，实际得到{got}个")]
    ParameterCountMismatch { expected: usize, got: usize },
    #[error("节点`{0}`不存在")]
    UnknownNode(String),
    #[error("计算错误：{0}")]
    ComputationError(String),
    #[error("无效操作：{0}")]
    InvalidOperation(String),
    #[error("（反）序列化错误：{0}")]
    Serialization(String),
}

impl From<TensorError> for GraphError {
    fn from(e: TensorError) -> Self {
        Self::ComputationError(e.to_string())
    }
}
