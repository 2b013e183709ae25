/*
 * @Date         : 2026-02-04
 * @Description  : 序列掩码（mask）的合并规则
 *
 * 掩码布局：
 * - 循环类数据：[batch, time]，1表示该时间步有效，0表示填充
 * - 前馈类数据：[rows, 1]（时间步被折叠进batch维时 rows = batch*time）
 * 缺省（None）表示全部有效。
 */

use crate::nn::GraphError;
use crate::tensor::Tensor;

/// 节点对输入掩码的合并策略，每种节点类型固定对应其中一种
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// 单输入节点：原样传递
    PassThrough,
    /// 多输入顶点：逐元素取“与”
    And,
    /// [batch, time] -> [batch*time, 1]（时间折叠进batch维的适配器）
    FlattenTime,
    /// [batch*time, 1] -> [batch, time]（从batch维还原时间维的适配器）
    UnflattenTime,
}

/// 按`policy`合并某节点所有输入边上的掩码，`batch_size`为本轮前向传播的样本数
pub fn combine_masks(
    masks: &[Option<&Tensor>],
    policy: MaskPolicy,
    batch_size: usize,
) -> Result<Option<Tensor>, GraphError> {
    match policy {
        MaskPolicy::PassThrough => Ok(masks.iter().flatten().next().map(|m| (*m).clone())),
        MaskPolicy::And => {
            let mut result: Option<Tensor> = None;
            for mask in masks.iter().flatten() {
                result = match result {
                    None => Some((*mask).clone()),
                    Some(acc) => {
                        if !acc.is_same_shape(mask) {
                            return Err(GraphError::ComputationError(format!(
                                "无法合并形状不同的掩码：{:?}与{:?}",
                                acc.shape(),
                                mask.shape()
                            )));
                        }
                        Some(&acc * *mask)
                    }
                };
            }
            Ok(result)
        }
        MaskPolicy::FlattenTime => match masks.iter().flatten().next() {
            None => Ok(None),
            Some(mask) => {
                if mask.dimension() != 2 {
                    return Err(GraphError::ComputationError(format!(
                        "时间折叠要求掩码形状为[batch, time]，但得到{:?}",
                        mask.shape()
                    )));
                }
                Ok(Some(mask.reshape(&[mask.size(), 1])?))
            }
        },
        MaskPolicy::UnflattenTime => match masks.iter().flatten().next() {
            None => Ok(None),
            Some(mask) => {
                if batch_size == 0 || mask.size() % batch_size != 0 {
                    return Err(GraphError::ComputationError(format!(
                        "掩码元素个数{}无法按batch大小{batch_size}还原时间维",
                        mask.size()
                    )));
                }
                Ok(Some(mask.reshape(&[batch_size, mask.size() / batch_size])?))
            }
        },
    }
}
