/*
 * @Date         : 2026-02-03
 * @Description  : 二维张量的矩阵乘法：[m, k] x [k, n] -> [m, n]
 */

use crate::errors::{Operator, TensorError};
use crate::tensor::Tensor;
use ndarray::Ix2;

impl Tensor {
    pub fn mat_mul(&self, other: &Self) -> Result<Self, TensorError> {
        let mismatch = || TensorError::OperatorError {
            operator: Operator::MatMul,
            tensor1_shape: self.shape().to_vec(),
            tensor2_shape: other.shape().to_vec(),
        };
        let a = self
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| mismatch())?;
        let b = other
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| mismatch())?;
        if a.ncols() != b.nrows() {
            return Err(mismatch());
        }
        Ok(Self::from_array(a.dot(&b).into_dyn()))
    }
}
