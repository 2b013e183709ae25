/*
 * @Date         : 2026-02-06
 * @Description  : 训练相关：由输出节点的损失函数计算分数与误差种子，逐样本打分，单步训练
 */

use super::{Graph, GraphError};
use crate::nn::nodes::TraitNode;
use crate::nn::{LossFunction, MultiDataSet, Optimizer};
use crate::tensor::Tensor;

impl Graph {
    /// 前向 + 反向：计算损失分数，并把梯度写入扁平梯度缓冲
    pub fn compute_gradient_and_score(&mut self, data: &MultiDataSet) -> Result<f32, GraphError> {
        self.forward_pass(&data.features, data.features_masks.as_deref(), true)?;
        let (score, seeds) = match self.loss_terms(data, true) {
            Ok(terms) => terms,
            Err(e) => {
                self.invalidate_pass();
                return Err(e);
            }
        };
        self.backward_pass(seeds)?;
        Ok(score)
    }

    /// 以推理模式计算损失分数（各输出节点分数之和），不做反向传播
    pub fn score(&mut self, data: &MultiDataSet) -> Result<f32, GraphError> {
        self.forward_pass(&data.features, data.features_masks.as_deref(), false)?;
        match self.loss_terms(data, false) {
            Ok((score, _)) => Ok(score),
            Err(e) => {
                self.invalidate_pass();
                Err(e)
            }
        }
    }

    /// 以推理模式逐样本打分，返回形状[batch, 1]，每行为该样本在所有输出节点上的损失之和（不做批平均）
    pub fn score_examples(&mut self, data: &MultiDataSet) -> Result<Tensor, GraphError> {
        self.forward_pass(&data.features, data.features_masks.as_deref(), false)?;
        let result = self.example_scores(data);
        if result.is_err() {
            self.invalidate_pass();
        }
        result
    }

    /// 单步训练：计算梯度后交给优化器更新参数，返回本步（更新前）的分数
    pub fn fit(
        &mut self,
        data: &MultiDataSet,
        optimizer: &mut dyn Optimizer,
    ) -> Result<f32, GraphError> {
        let score = self.compute_gradient_and_score(data)?;
        optimizer.update(self)?;
        self.advance_iterations(1);
        Ok(score)
    }

    /// 已完成的训练步数，随模型一起保存
    pub fn iteration_count(&self) -> u64 {
        self.descriptor.iteration_count
    }

    pub(in crate::nn) fn advance_iterations(&mut self, steps: u64) {
        self.descriptor.iteration_count += steps;
    }

    fn example_scores(&self, data: &MultiDataSet) -> Result<Tensor, GraphError> {
        self.check_label_count(data)?;
        let batch_size = self.pass.batch_size;
        let mut total = Tensor::zeros(&[batch_size, 1]);
        for (k, &idx) in self.outputs.iter().enumerate() {
            let (loss, output) = self.output_loss(idx)?;
            let mask = data.label_mask(k).or(self.pass.masks[idx].as_ref());
            let per_example = loss.score_examples(output, &data.labels[k], mask)?;
            if per_example.shape()[0] != batch_size {
                return Err(GraphError::ComputationError(format!(
                    "输出节点`{}`有{}行，无法按{}个样本逐样本打分",
                    self.nodes[idx].name,
                    per_example.shape()[0],
                    batch_size
                )));
            }
            total += &per_example;
        }
        Ok(total)
    }

    fn check_label_count(&self, data: &MultiDataSet) -> Result<(), GraphError> {
        if data.labels.len() != self.outputs.len() {
            return Err(GraphError::InvalidOperation(format!(
                "图有{}个输出节点，但提供了{}个标签张量",
                self.outputs.len(),
                data.labels.len()
            )));
        }
        Ok(())
    }

    /// 输出节点的损失函数及其本轮激活值
    fn output_loss(&self, idx: usize) -> Result<(LossFunction, &Tensor), GraphError> {
        let node = &self.nodes[idx];
        let loss = node.node.loss().ok_or_else(|| {
            GraphError::InvalidOperation(format!(
                "输出节点`{}`没有损失函数，请改用backprop_gradient注入误差",
                node.name
            ))
        })?;
        let output = self.pass.activations[idx].as_ref().ok_or_else(|| {
            GraphError::InvalidOperation(format!("输出节点`{}`没有值", node.name))
        })?;
        Ok((loss, output))
    }

    fn loss_terms(
        &self,
        data: &MultiDataSet,
        with_gradient: bool,
    ) -> Result<(f32, Vec<(usize, Tensor)>), GraphError> {
        self.check_label_count(data)?;
        let batch_size = self.pass.batch_size;
        let mut score = 0.0;
        let mut seeds = Vec::with_capacity(self.outputs.len());
        for (k, &idx) in self.outputs.iter().enumerate() {
            let (loss, output) = self.output_loss(idx)?;
            let labels = &data.labels[k];
            let mask = data.label_mask(k).or(self.pass.masks[idx].as_ref());
            score += loss.score(output, labels, mask, batch_size)?;
            if with_gradient {
                seeds.push((idx, loss.gradient(output, labels, mask, batch_size)?));
            }
        }
        Ok((score, seeds))
    }
}
