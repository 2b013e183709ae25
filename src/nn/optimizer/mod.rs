/*
 * @Date         : 2026-02-07
 * @Description  : 优化器：在一轮完整的前向-反向传播之后，用扁平梯度缓冲更新扁平参数缓冲
 */

mod adam;
mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use crate::nn::{Graph, GraphError, PassState};

/// 优化器只更新非冻结节点的参数区间
pub trait Optimizer {
    fn update(&mut self, graph: &mut Graph) -> Result<(), GraphError>;

    fn learning_rate(&self) -> f32;
}

/// 检查图是否刚完成一轮反向传播（梯度有效）
fn ensure_gradients(graph: &Graph) -> Result<(), GraphError> {
    if graph.pass_state() == PassState::BackwardComplete {
        Ok(())
    } else {
        Err(GraphError::InvalidOperation(
            "更新参数前须先完成一轮反向传播".to_string(),
        ))
    }
}
