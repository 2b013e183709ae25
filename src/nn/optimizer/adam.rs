/*
 * @Date         : 2026-02-07
 * @Description  : Adam优化器实现
 */

use super::{Optimizer, ensure_gradients};
use crate::nn::{Graph, GraphError};

/// Adam优化器，一阶、二阶矩与扁平参数缓冲一一对应
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// 一阶矩估计
    m: Vec<f32>,
    /// 二阶矩估计
    v: Vec<f32>,
    /// 时间步
    t: i32,
}

impl Adam {
    /// 使用默认参数（β1=0.9，β2=0.999，ε=1e-8）创建Adam优化器
    pub const fn new(learning_rate: f32) -> Self {
        Self::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub const fn with_params(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, graph: &mut Graph) -> Result<(), GraphError> {
        ensure_gradients(graph)?;
        let n = graph.num_params();
        if self.m.len() != n {
            self.m = vec![0.0; n];
            self.v = vec![0.0; n];
            self.t = 0;
        }
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        let ranges = graph.trainable_ranges();
        let (params, grads) = graph.params_and_grads_mut();
        for range in ranges {
            for i in range {
                let g = grads[i];
                self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
                self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;
                let m_hat = self.m[i] / bias1;
                let v_hat = self.v[i] / bias2;
                params[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
