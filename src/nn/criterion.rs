/*
 * @Date         : 2026-02-05
 * @Description  : 输出节点使用的损失函数
 *
 * 分数按minibatch（样本数）取平均，被掩码（mask=0）的位置不贡献分数也不产生梯度。
 * 返回的梯度是损失对输出节点激活值（激活函数之后）的梯度，由输出节点自己再乘上激活函数的导数。
 */

use super::GraphError;
use crate::tensor::Tensor;
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use serde::{Deserialize, Serialize};

/// 交叉熵中对概率的下限截断，避免ln(0)
const MIN_PROBABILITY: f32 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    /// 均方误差：每个样本的平方误差之和除以输出维数
    Mse,
    /// 多类交叉熵，通常与softmax激活搭配
    Mcxent,
}

impl LossFunction {
    pub fn score(
        &self,
        output: &Tensor,
        labels: &Tensor,
        mask: Option<&Tensor>,
        batch_size: usize,
    ) -> Result<f32, GraphError> {
        let terms = self.element_terms(output, labels, mask)?;
        Ok(terms.sum() / self.normalizer(output) / batch_size.max(1) as f32)
    }

    /// 逐样本分数，形状[rows, 1]：每行为该样本所有元素（含时间步）的损失之和，不按批大小平均
    pub fn score_examples(
        &self,
        output: &Tensor,
        labels: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<Tensor, GraphError> {
        let terms = self.element_terms(output, labels, mask)?;
        let norm = self.normalizer(output);
        let per_row = terms
            .axis_iter(Axis(0))
            .map(|row| row.sum() / norm)
            .collect::<Vec<_>>();
        Ok(Tensor::new(&per_row, &[per_row.len(), 1]))
    }

    pub fn gradient(
        &self,
        output: &Tensor,
        labels: &Tensor,
        mask: Option<&Tensor>,
        batch_size: usize,
    ) -> Result<Tensor, GraphError> {
        check_labels(output, labels)?;
        let mask = expand_mask(mask, output.shape())?;
        let (y, t) = (output.view(), labels.view());
        let batch = batch_size.max(1) as f32;
        let grad = match self {
            Self::Mse => {
                let n_out = output.shape()[1].max(1) as f32;
                Zip::from(&y)
                    .and(&t)
                    .and(&mask)
                    .map_collect(|&y, &t, &m| m * 2.0 * (y - t) / n_out / batch)
            }
            Self::Mcxent => Zip::from(&y)
                .and(&t)
                .and(&mask)
                .map_collect(|&y, &t, &m| -m * t / y.clamp(MIN_PROBABILITY, 1.0) / batch),
        };
        Ok(Tensor::from_array(grad))
    }

    /// 逐元素的损失项（已乘掩码，未做任何平均）
    fn element_terms(
        &self,
        output: &Tensor,
        labels: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<ArrayD<f32>, GraphError> {
        check_labels(output, labels)?;
        let mask = expand_mask(mask, output.shape())?;
        let (y, t) = (output.view(), labels.view());
        Ok(match self {
            Self::Mse => Zip::from(&y)
                .and(&t)
                .and(&mask)
                .map_collect(|&y, &t, &m| m * (y - t) * (y - t)),
            Self::Mcxent => Zip::from(&y)
                .and(&t)
                .and(&mask)
                .map_collect(|&y, &t, &m| -(m * t * y.clamp(MIN_PROBABILITY, 1.0).ln())),
        })
    }

    fn normalizer(&self, output: &Tensor) -> f32 {
        match self {
            Self::Mse => output.shape()[1].max(1) as f32,
            Self::Mcxent => 1.0,
        }
    }
}

fn check_labels(output: &Tensor, labels: &Tensor) -> Result<(), GraphError> {
    if !output.is_same_shape(labels) {
        return Err(GraphError::ComputationError(format!(
            "标签形状{:?}与输出形状{:?}不一致",
            labels.shape(),
            output.shape()
        )));
    }
    if output.dimension() < 2 {
        return Err(GraphError::ComputationError(format!(
            "输出至少须为二维张量，但形状为{:?}",
            output.shape()
        )));
    }
    Ok(())
}

/// 把掩码展开成与输出同形：[rows, 1] -> [rows, n]；[b, T] -> [b, n, T]
fn expand_mask(mask: Option<&Tensor>, shape: &[usize]) -> Result<ArrayD<f32>, GraphError> {
    let Some(mask) = mask else {
        return Ok(ArrayD::ones(IxDyn(shape)));
    };
    let view = mask.view();
    let view = if shape.len() == 3 && mask.dimension() == 2 {
        view.insert_axis(Axis(1))
    } else {
        view
    };
    view.broadcast(IxDyn(shape))
        .map(|v| v.to_owned())
        .ok_or_else(|| {
            GraphError::ComputationError(format!(
                "掩码形状{:?}无法匹配输出形状{shape:?}",
                mask.shape()
            ))
        })
}
