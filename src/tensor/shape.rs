/*
 * @Date         : 2026-02-03
 * @Description  : 张量的形状变换：重塑、维度置换、沿某维拼接/截取、二维转置
 */

use super::Tensor;
use crate::errors::{ComparisonOperator, Operator, TensorError};
use ndarray::{Axis, IxDyn, Slice};

impl Tensor {
    /// 按行优先顺序重塑为新形状，元素总数必须一致
    pub fn reshape(&self, shape: &[usize]) -> Result<Self, TensorError> {
        let new_total: usize = shape.iter().product();
        if new_total != self.size() {
            return Err(TensorError::ReshapeMismatch {
                from: self.shape().to_vec(),
                to: shape.to_vec(),
            });
        }
        let data = self
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(shape))
            .map_err(|_| TensorError::IncompatibleShape)?;
        Ok(Self { data })
    }

    /// 维度置换，如形状为[b, n, t]的张量经`permute(&[0, 2, 1])`后形状为[b, t, n]
    pub fn permute(&self, axes: &[usize]) -> Result<Self, TensorError> {
        let rank = self.dimension();
        let mut seen = vec![false; rank];
        if axes.len() != rank {
            return Err(TensorError::PermuteNeedUniqueAndInRange);
        }
        for &axis in axes {
            if axis >= rank || seen[axis] {
                return Err(TensorError::PermuteNeedUniqueAndInRange);
            }
            seen[axis] = true;
        }
        Ok(Self::from_array(
            self.data.clone().permuted_axes(IxDyn(axes)),
        ))
    }

    /// 沿`axis`维把多个张量拼接起来，其余维度须一致
    pub fn concat(tensors: &[&Self], axis: usize) -> Result<Self, TensorError> {
        let first = tensors.first().ok_or(TensorError::EmptyList)?;
        if axis >= first.dimension() {
            return Err(TensorError::AxisOutOfRange {
                axis,
                operator: ComparisonOperator::LessThan,
                threshold: first.dimension(),
            });
        }
        let views = tensors.iter().map(|t| t.data.view()).collect::<Vec<_>>();
        let data = ndarray::concatenate(Axis(axis), &views).map_err(|_| {
            let second = tensors.iter().find(|t| {
                t.dimension() != first.dimension()
                    || t.shape()
                        .iter()
                        .zip(first.shape())
                        .enumerate()
                        .any(|(i, (a, b))| i != axis && a != b)
            });
            TensorError::OperatorError {
                operator: Operator::Concat,
                tensor1_shape: first.shape().to_vec(),
                tensor2_shape: second.map(|t| t.shape().to_vec()).unwrap_or_default(),
            }
        })?;
        Ok(Self::from_array(data))
    }

    /// 沿`axis`维截取`[start, start + len)`区间，返回新张量
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Self, TensorError> {
        if axis >= self.dimension() {
            return Err(TensorError::AxisOutOfRange {
                axis,
                operator: ComparisonOperator::LessThan,
                threshold: self.dimension(),
            });
        }
        if start + len > self.shape()[axis] {
            return Err(TensorError::IncompatibleShape);
        }
        let data = self
            .data
            .slice_axis(Axis(axis), Slice::from(start..start + len))
            .to_owned();
        Ok(Self::from_array(data))
    }

    /// 二维张量的转置
    pub fn transpose(&self) -> Result<Self, TensorError> {
        if self.dimension() != 2 {
            return Err(TensorError::IncompatibleShape);
        }
        self.permute(&[1, 0])
    }
}
