/*
 * @Date         : 2026-02-06
 * @Description  : 扁平参数/梯度缓冲：整体读写，以及按“节点名_参数名”访问的参数表与零拷贝视图
 */

use super::{Graph, GraphError, GraphNode};
use crate::nn::nodes::ParamSlot;
use crate::tensor::Tensor;
use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn};
use tracing::debug;

impl Graph {
    /// 图中所有可学习参数的个数
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// 单个节点的参数个数
    pub fn node_num_params(&self, name: &str) -> Result<usize, GraphError> {
        Ok(self.node(name)?.params.iter().map(ParamSlot::len).sum())
    }

    /// 扁平参数缓冲：节点按求值顺序排列，节点内按参数声明顺序排列
    pub fn flat_params(&self) -> &[f32] {
        &self.params
    }

    /// 扁平梯度缓冲，布局与`flat_params`完全一致；冻结节点对应的区间恒为0
    pub fn flat_gradients(&self) -> &[f32] {
        &self.grads
    }

    /// 整体替换参数；长度不符时报错且原参数保持不变
    pub fn set_flat_params(&mut self, values: &[f32]) -> Result<(), GraphError> {
        if values.len() != self.params.len() {
            return Err(GraphError::ParameterCountMismatch {
                expected: self.params.len(),
                got: values.len(),
            });
        }
        self.params.copy_from_slice(values);
        Ok(())
    }

    /// 参数表：键为`<节点名>_<参数名>`，按缓冲布局顺序排列
    pub fn param_table(&self) -> Vec<(String, Tensor)> {
        self.nodes
            .iter()
            .filter(|n| !n.synthetic)
            .flat_map(|node| {
                node.params.iter().map(move |slot| {
                    (
                        format!("{}_{}", node.name, slot.name),
                        self.slot_tensor(slot),
                    )
                })
            })
            .collect()
    }

    /// 读取某节点的某个参数（拷贝）
    pub fn get_param(&self, node: &str, param: &str) -> Result<Tensor, GraphError> {
        let slot = find_slot(self.node(node)?, param)?;
        Ok(self.slot_tensor(slot))
    }

    /// 覆盖某节点的某个参数，形状须与声明一致
    pub fn set_param(&mut self, node: &str, param: &str, value: &Tensor) -> Result<(), GraphError> {
        let slot = find_slot(self.node(node)?, param)?;
        if value.shape() != slot.shape.as_slice() {
            return Err(GraphError::InvalidOperation(format!(
                "参数`{node}_{param}`的形状为{:?}，不能用形状为{:?}的张量覆盖",
                slot.shape,
                value.shape()
            )));
        }
        let range = slot.range();
        for (dst, src) in self.params[range].iter_mut().zip(value.view().iter()) {
            *dst = *src;
        }
        Ok(())
    }

    /// 某参数在扁平缓冲上的只读视图（零拷贝）
    pub fn param_view(&self, node: &str, param: &str) -> Result<ArrayViewD<'_, f32>, GraphError> {
        let slot = find_slot(self.node(node)?, param)?;
        view_of(&self.params, slot)
    }

    /// 某参数在扁平缓冲上的可写视图，写入直接作用于图的参数
    pub fn param_view_mut(
        &mut self,
        node: &str,
        param: &str,
    ) -> Result<ArrayViewMutD<'_, f32>, GraphError> {
        let idx = self.node_index(node)?;
        let slot = find_slot(&self.nodes[idx], param)?;
        let shape = slot.shape.clone();
        let range = slot.range();
        ArrayViewMutD::from_shape(IxDyn(&shape), &mut self.params[range])
            .map_err(|e| {
                GraphError::ComputationError(format!("参数`{node}_{param}`视图构建失败：{e}"))
            })
    }

    /// 某参数的梯度视图
    pub fn grad_view(&self, node: &str, param: &str) -> Result<ArrayViewD<'_, f32>, GraphError> {
        let slot = find_slot(self.node(node)?, param)?;
        view_of(&self.grads, slot)
    }

    /// 同一参数的（参数视图，梯度视图），二者下标一一对应
    pub fn view_for(
        &self,
        node: &str,
        param: &str,
    ) -> Result<(ArrayViewD<'_, f32>, ArrayViewD<'_, f32>), GraphError> {
        let slot = find_slot(self.node(node)?, param)?;
        Ok((view_of(&self.params, slot)?, view_of(&self.grads, slot)?))
    }

    /// 供优化器使用：可写的参数缓冲与只读的梯度缓冲
    pub(in crate::nn) fn params_and_grads_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grads)
    }

    /// 按“节点名+参数名”从另一个图拷贝形状一致的参数，返回拷贝的参数个数
    pub(in crate::nn) fn copy_params_from(&mut self, other: &Self) -> usize {
        let mut copied = 0;
        for node in &self.nodes {
            let Ok(src_node) = other.node(&node.name) else {
                continue;
            };
            for slot in &node.params {
                let Some(src) = src_node
                    .params
                    .iter()
                    .find(|s| s.name == slot.name && s.shape == slot.shape)
                else {
                    continue;
                };
                self.params[slot.range()].copy_from_slice(&other.params[src.range()]);
                copied += slot.len();
            }
        }
        debug!(copied, total = self.params.len(), "从源图拷贝参数");
        copied
    }

    fn slot_tensor(&self, slot: &ParamSlot) -> Tensor {
        Tensor::new(&self.params[slot.range()], &slot.shape)
    }
}

fn find_slot<'a>(node: &'a GraphNode, param: &str) -> Result<&'a ParamSlot, GraphError> {
    node.params.iter().find(|s| s.name == param).ok_or_else(|| {
        GraphError::InvalidOperation(format!("节点`{}`没有名为`{param}`的参数", node.name))
    })
}

fn view_of<'a>(buffer: &'a [f32], slot: &ParamSlot) -> Result<ArrayViewD<'a, f32>, GraphError> {
    ArrayViewD::from_shape(IxDyn(&slot.shape), &buffer[slot.range()])
        .map_err(|e| GraphError::ComputationError(format!("参数`{}`视图构建失败：{e}", slot.name)))
}
