/*
 * @Date         : 2026-02-04
 * @Description  : 层内使用的激活函数。反向传播只依赖前向的输出值y（各函数的导数都能由y表示），
 *                 所以节点不必额外缓存激活前的值。softmax沿第1维（特征维）归一化。
 */

use ndarray::{ArrayD, ArrayViewD, Axis, Zip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Identity,
    Tanh,
    Sigmoid,
    Relu,
    Softmax,
}

impl Activation {
    pub fn forward(&self, mut z: ArrayD<f32>) -> ArrayD<f32> {
        match self {
            Self::Identity => z,
            Self::Tanh => {
                z.mapv_inplace(f32::tanh);
                z
            }
            Self::Sigmoid => {
                z.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp()));
                z
            }
            Self::Relu => {
                z.mapv_inplace(|x| x.max(0.0));
                z
            }
            Self::Softmax => {
                let max = z
                    .map_axis(Axis(1), |lane| {
                        lane.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x))
                    })
                    .insert_axis(Axis(1));
                let mut e = &z - &max;
                e.mapv_inplace(f32::exp);
                let sum = e.sum_axis(Axis(1)).insert_axis(Axis(1));
                &e / &sum
            }
        }
    }

    /// 由输出`y`和损失对输出的梯度`grad`，求损失对激活前的值的梯度
    pub fn backward(&self, y: ArrayViewD<'_, f32>, grad: ArrayViewD<'_, f32>) -> ArrayD<f32> {
        match self {
            Self::Identity => grad.to_owned(),
            Self::Tanh => Zip::from(&grad)
                .and(&y)
                .map_collect(|&g, &y| g * (1.0 - y * y)),
            Self::Sigmoid => Zip::from(&grad)
                .and(&y)
                .map_collect(|&g, &y| g * y * (1.0 - y)),
            Self::Relu => Zip::from(&grad)
                .and(&y)
                .map_collect(|&g, &y| if y > 0.0 { g } else { 0.0 }),
            Self::Softmax => {
                // dz = y * (g - Σ(g*y))
                let dot = (&grad * &y).sum_axis(Axis(1)).insert_axis(Axis(1));
                &y * &(&grad - &dot)
            }
        }
    }
}
