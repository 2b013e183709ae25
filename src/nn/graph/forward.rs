/*
 * @Date         : 2026-02-06
 * @Description  : 前向传播：按求值顺序依次合并输入掩码、调用节点的前向计算，并暂存各节点的激活值
 */

use super::{Graph, GraphError, PassCache, PassState};
use crate::nn::mask::combine_masks;
use crate::nn::nodes::{ForwardContext, ParamView, TraitNode};
use crate::tensor::Tensor;
use std::collections::HashMap;
use tracing::trace;

impl Graph {
    /// 前向传播，返回所有节点（含自动插入的适配器）的激活值
    pub fn feed_forward(
        &mut self,
        inputs: &[Tensor],
        training: bool,
    ) -> Result<HashMap<String, Tensor>, GraphError> {
        self.forward_pass(inputs, None, training)?;
        Ok(self
            .nodes
            .iter()
            .zip(&self.pass.activations)
            .filter_map(|(node, act)| act.as_ref().map(|a| (node.name.clone(), a.clone())))
            .collect())
    }

    /// 推理：返回各输出节点的激活值，顺序同`outputs`声明
    pub fn output(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>, GraphError> {
        self.forward_pass(inputs, None, false)?;
        self.output_activations()
    }

    /// 带输入掩码的推理，`masks`与`inputs`一一对应
    pub fn output_with_masks(
        &mut self,
        inputs: &[Tensor],
        masks: &[Option<Tensor>],
    ) -> Result<Vec<Tensor>, GraphError> {
        self.forward_pass(inputs, Some(masks), false)?;
        self.output_activations()
    }

    /// 单输入、单输出图的推理
    pub fn output_single(&mut self, input: &Tensor) -> Result<Tensor, GraphError> {
        if self.inputs.len() != 1 || self.outputs.len() != 1 {
            return Err(GraphError::InvalidOperation(format!(
                "output_single只适用于单输入单输出的图，但该图有{}个输入、{}个输出",
                self.inputs.len(),
                self.outputs.len()
            )));
        }
        let mut outputs = self.output(std::slice::from_ref(input))?;
        outputs.pop().ok_or_else(|| {
            GraphError::ComputationError("前向传播没有产生输出".to_string())
        })
    }

    /// 最近一轮前向传播中某节点的激活值
    pub fn activation(&self, name: &str) -> Result<Option<&Tensor>, GraphError> {
        let idx = self.node_index(name)?;
        Ok(self.pass.activations.get(idx).and_then(Option::as_ref))
    }

    /// 最近一轮前向传播中某节点输出所带的掩码
    pub fn mask(&self, name: &str) -> Result<Option<&Tensor>, GraphError> {
        let idx = self.node_index(name)?;
        Ok(self.pass.masks.get(idx).and_then(Option::as_ref))
    }

    pub(in crate::nn) fn output_activations(&self) -> Result<Vec<Tensor>, GraphError> {
        self.outputs
            .iter()
            .map(|&idx| {
                self.pass.activations[idx].clone().ok_or_else(|| {
                    GraphError::InvalidOperation(format!(
                        "输出节点`{}`没有值，请先执行前向传播",
                        self.nodes[idx].name
                    ))
                })
            })
            .collect()
    }

    /// 一轮完整的前向传播；失败时丢弃本轮所有暂存状态
    pub(in crate::nn) fn forward_pass(
        &mut self,
        inputs: &[Tensor],
        masks: Option<&[Option<Tensor>]>,
        training: bool,
    ) -> Result<(), GraphError> {
        self.invalidate_pass();
        match self.run_forward(inputs, masks, training) {
            Ok(()) => {
                self.pass.state = PassState::ForwardComplete;
                Ok(())
            }
            Err(e) => {
                self.invalidate_pass();
                Err(e)
            }
        }
    }

    fn run_forward(
        &mut self,
        inputs: &[Tensor],
        masks: Option<&[Option<Tensor>]>,
        training: bool,
    ) -> Result<(), GraphError> {
        // 1. 校验外部输入
        if inputs.len() != self.inputs.len() {
            return Err(GraphError::InvalidOperation(format!(
                "图有{}个输入节点，但提供了{}个输入张量",
                self.inputs.len(),
                inputs.len()
            )));
        }
        if let Some(masks) = masks {
            if masks.len() != inputs.len() {
                return Err(GraphError::InvalidOperation(format!(
                    "输入掩码有{}个，但输入张量有{}个",
                    masks.len(),
                    inputs.len()
                )));
            }
        }
        let batch_size = inputs
            .first()
            .and_then(|t| t.shape().first().copied())
            .unwrap_or(0);
        if let Some(t) = inputs
            .iter()
            .find(|t| t.shape().first().copied() != Some(batch_size))
        {
            return Err(GraphError::InvalidOperation(format!(
                "各输入的样本数须一致：{batch_size}与{:?}",
                t.shape()
            )));
        }

        // 2. 按求值顺序逐节点计算
        let n = self.nodes.len();
        let Self {
            nodes,
            params,
            pass,
            inputs: input_indices,
            ..
        } = self;
        *pass = PassCache {
            state: PassState::Idle,
            training,
            batch_size,
            activations: vec![None; n],
            masks: vec![None; n],
            epsilons: vec![None; n],
        };

        for idx in 0..n {
            let node = &mut nodes[idx];
            let (output, mask) = if node.node.is_input() {
                let position = input_indices.iter().position(|&i| i == idx).ok_or_else(|| {
                    GraphError::ComputationError(format!("输入节点`{}`未登记", node.name))
                })?;
                let ctx = ForwardContext {
                    training,
                    batch_size,
                    mask: None,
                };
                let output = node
                    .node
                    .forward(&[&inputs[position]], &ParamView::empty(), &ctx)?;
                let mask = masks.and_then(|m| m[position].clone());
                (output, mask)
            } else {
                let input_acts = node
                    .inputs
                    .iter()
                    .map(|&p| {
                        pass.activations[p].as_ref().ok_or_else(|| {
                            GraphError::ComputationError(format!(
                                "节点`{}`的输入没有值。不该触及本错误，否则说明crate代码有问题",
                                node.name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let input_masks = node
                    .inputs
                    .iter()
                    .map(|&p| pass.masks[p].as_ref())
                    .collect::<Vec<_>>();
                let mask = combine_masks(&input_masks, node.node.mask_policy(), batch_size)?;
                let ctx = ForwardContext {
                    training,
                    batch_size,
                    mask: mask.as_ref(),
                };
                let view = ParamView::new(&node.params, params);
                let output = node.node.forward(&input_acts, &view, &ctx)?;
                (output, mask)
            };
            trace!(node = %node.name, shape = ?output.shape(), "前向");
            pass.activations[idx] = Some(output);
            pass.masks[idx] = mask;
        }
        Ok(())
    }
}
