/*
 * @Date         : 2026-02-05
 * @Description  : 多输入、多输出的一个minibatch
 */

use crate::tensor::Tensor;

/// `features`按图的输入节点顺序排列，`labels`按输出节点顺序排列；
/// 掩码缺省表示全部有效
#[derive(Debug, Clone, PartialEq)]
pub struct MultiDataSet {
    pub features: Vec<Tensor>,
    pub labels: Vec<Tensor>,
    pub features_masks: Option<Vec<Option<Tensor>>>,
    pub labels_masks: Option<Vec<Option<Tensor>>>,
}

impl MultiDataSet {
    pub const fn new(features: Vec<Tensor>, labels: Vec<Tensor>) -> Self {
        Self {
            features,
            labels,
            features_masks: None,
            labels_masks: None,
        }
    }

    /// 单输入、单输出
    pub fn single(features: Tensor, labels: Tensor) -> Self {
        Self::new(vec![features], vec![labels])
    }

    pub fn with_features_masks(mut self, masks: Vec<Option<Tensor>>) -> Self {
        self.features_masks = Some(masks);
        self
    }

    pub fn with_labels_masks(mut self, masks: Vec<Option<Tensor>>) -> Self {
        self.labels_masks = Some(masks);
        self
    }

    /// 样本数（取第一个特征张量的第0维）
    pub fn batch_size(&self) -> usize {
        self.features
            .first()
            .and_then(|f| f.shape().first().copied())
            .unwrap_or(0)
    }

    pub(crate) fn label_mask(&self, index: usize) -> Option<&Tensor> {
        self.labels_masks
            .as_ref()
            .and_then(|masks| masks.get(index))
            .and_then(Option::as_ref)
    }
}
