/*
 * @Date         : 2026-02-07
 * @Description  : 梯度下降优化器
 */

use super::{Optimizer, ensure_gradients};
use crate::nn::{Graph, GraphError};

/// SGD (随机梯度下降) 优化器：θ = θ - α * ∇θ
#[derive(Debug, Clone, PartialEq)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub const fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, graph: &mut Graph) -> Result<(), GraphError> {
        ensure_gradients(graph)?;
        let ranges = graph.trainable_ranges();
        let (params, grads) = graph.params_and_grads_mut();
        for range in ranges {
            for (p, g) in params[range.clone()].iter_mut().zip(&grads[range]) {
                *p -= self.learning_rate * g;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
