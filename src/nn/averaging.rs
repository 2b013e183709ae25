/*
 * @Date         : 2026-02-08
 * @Description  : 多实例参数平均：每个数据分片由一个克隆出的图实例独立训练，
 *                 之后把各实例的扁平参数“先求和再平均”写回主图
 */

use crate::nn::{Graph, GraphError, MultiDataSet, Optimizer};
use rayon::prelude::*;
use tracing::debug;

/// 参数平均的聚合结果。`combine`满足结合律，`empty()`为单位元，
/// 因此各实例的结果可以按任意分组归并
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationTuple {
    pub params_sum: Vec<f32>,
    pub score_sum: f64,
    pub count: usize,
}

impl AggregationTuple {
    pub const fn empty() -> Self {
        Self {
            params_sum: Vec::new(),
            score_sum: 0.0,
            count: 0,
        }
    }

    /// 单个图实例的贡献
    pub fn from_graph(graph: &Graph, score: f32) -> Self {
        Self {
            params_sum: graph.flat_params().to_vec(),
            score_sum: f64::from(score),
            count: 1,
        }
    }

    pub fn combine(self, other: Self) -> Result<Self, GraphError> {
        if self.count == 0 {
            return Ok(other);
        }
        if other.count == 0 {
            return Ok(self);
        }
        if self.params_sum.len() != other.params_sum.len() {
            return Err(GraphError::ParameterCountMismatch {
                expected: self.params_sum.len(),
                got: other.params_sum.len(),
            });
        }
        let mut params_sum = self.params_sum;
        for (acc, v) in params_sum.iter_mut().zip(&other.params_sum) {
            *acc += v;
        }
        Ok(Self {
            params_sum,
            score_sum: self.score_sum + other.score_sum,
            count: self.count + other.count,
        })
    }

    /// 平均后的（扁平参数，分数）
    pub fn average(&self) -> Result<(Vec<f32>, f32), GraphError> {
        if self.count == 0 {
            return Err(GraphError::InvalidOperation(
                "没有任何实例参与聚合，无法求平均".to_string(),
            ));
        }
        let n = self.count as f32;
        let params = self.params_sum.iter().map(|v| v / n).collect();
        Ok((params, (self.score_sum / self.count as f64) as f32))
    }
}

/// 参数平均训练器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterAveraging {
    /// 每个实例在自己的分片上做几次`fit`
    pub iterations_per_split: usize,
}

impl Default for ParameterAveraging {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ParameterAveraging {
    pub const fn new(iterations_per_split: usize) -> Self {
        Self {
            iterations_per_split,
        }
    }

    /// 每个分片克隆一个图实例并行训练，平均后的参数写回`graph`，返回平均分数
    ///
    /// 各实例拥有独立的参数/梯度缓冲，彼此之间不共享内存；`make_optimizer`为每个实例创建一个新优化器。
    pub fn fit<O, F>(
        &self,
        graph: &mut Graph,
        splits: &[MultiDataSet],
        make_optimizer: F,
    ) -> Result<f32, GraphError>
    where
        O: Optimizer,
        F: Fn() -> O + Sync,
    {
        if splits.is_empty() {
            return Err(GraphError::InvalidOperation(
                "参数平均至少需要一个数据分片".to_string(),
            ));
        }
        let baseline: &Graph = graph;
        let tuples = splits
            .par_iter()
            .map(|split| -> Result<AggregationTuple, GraphError> {
                let mut worker = baseline.clone();
                let mut optimizer = make_optimizer();
                let mut score = 0.0;
                for _ in 0..self.iterations_per_split.max(1) {
                    score = worker.fit(split, &mut optimizer)?;
                }
                Ok(AggregationTuple::from_graph(&worker, score))
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        let total = tuples
            .into_iter()
            .try_fold(AggregationTuple::empty(), AggregationTuple::combine)?;
        let (params, score) = total.average()?;
        graph.set_flat_params(&params)?;
        // 各实例并行地走完同样的步数，主图只前进一份
        graph.advance_iterations(self.iterations_per_split.max(1) as u64);
        debug!(workers = total.count, score, "参数平均完成");
        Ok(score)
    }
}
