/*
 * @Date         : 2026-02-06
 * @Description  : 反向传播：按求值顺序的逆序，把各消费者传回的梯度精确求和后交给节点，
 *                 并把参数梯度累加进扁平梯度缓冲（冻结节点的参数梯度被丢弃，但梯度照常流向其输入）
 */

use super::{Graph, GraphError, PassCache, PassState};
use crate::nn::nodes::{BackwardContext, Backprop, ParamView, TraitNode};
use crate::tensor::Tensor;
use tracing::{trace, warn};

/// 把一份梯度贡献累加到节点的梯度上（精确求和，不取平均）
fn accumulate(slot: &mut Option<Tensor>, contribution: Tensor) {
    match slot {
        Some(acc) => *acc += &contribution,
        None => *slot = Some(contribution),
    }
}

impl Graph {
    /// 以外部注入的误差（损失对各输出节点激活值的梯度，顺序同`outputs`）执行反向传播
    pub fn backprop_gradient(&mut self, epsilons: &[Tensor]) -> Result<(), GraphError> {
        if epsilons.len() != self.outputs.len() {
            return Err(GraphError::InvalidOperation(format!(
                "图有{}个输出节点，但提供了{}个误差张量",
                self.outputs.len(),
                epsilons.len()
            )));
        }
        let seeds = self
            .outputs
            .iter()
            .copied()
            .zip(epsilons.iter().cloned())
            .collect();
        self.backward_pass(seeds)
    }

    /// 最近一轮反向传播中损失对某节点输出的梯度
    pub fn gradient_of(&self, name: &str) -> Result<Option<&Tensor>, GraphError> {
        let idx = self.node_index(name)?;
        Ok(self.pass.epsilons.get(idx).and_then(Option::as_ref))
    }

    /// 一轮完整的反向传播，须紧接在前向传播之后；失败时丢弃本轮所有暂存状态
    pub(in crate::nn) fn backward_pass(
        &mut self,
        seeds: Vec<(usize, Tensor)>,
    ) -> Result<(), GraphError> {
        if self.pass.state != PassState::ForwardComplete {
            return Err(GraphError::InvalidOperation(
                "反向传播须紧接在一轮完整的前向传播之后".to_string(),
            ));
        }
        if !self.pass.training {
            warn!("[only_graph 警告] 在推理模式下调用反向传播，这通常是误用");
        }
        match self.run_backward(seeds) {
            Ok(()) => {
                self.pass.state = PassState::BackwardComplete;
                Ok(())
            }
            Err(e) => {
                self.invalidate_pass();
                self.grads.fill(0.0);
                Err(e)
            }
        }
    }

    fn run_backward(&mut self, seeds: Vec<(usize, Tensor)>) -> Result<(), GraphError> {
        let Self {
            nodes,
            params,
            grads,
            pass,
            ..
        } = self;
        let PassCache {
            activations,
            masks,
            epsilons,
            batch_size,
            ..
        } = pass;
        grads.fill(0.0);
        epsilons.iter_mut().for_each(|e| *e = None);

        // 1. 在输出节点上播种
        for (idx, seed) in seeds {
            let output = activations[idx].as_ref().ok_or_else(|| {
                GraphError::InvalidOperation(format!("输出节点`{}`没有值", nodes[idx].name))
            })?;
            if !output.is_same_shape(&seed) {
                return Err(GraphError::ComputationError(format!(
                    "输出节点`{}`的误差形状{:?}与其输出形状{:?}不一致",
                    nodes[idx].name,
                    seed.shape(),
                    output.shape()
                )));
            }
            accumulate(&mut epsilons[idx], seed);
        }

        // 2. 逆序遍历
        for idx in (0..nodes.len()).rev() {
            let node = &mut nodes[idx];
            if node.node.is_input() {
                continue;
            }
            let Some(grad) = epsilons[idx].as_ref() else {
                if node.node.is_learnable() {
                    warn!(node = %node.name, "节点没有收到任何梯度（它不在任何输出的上游）");
                }
                continue;
            };
            let input_acts = node
                .inputs
                .iter()
                .map(|&p| {
                    activations[p].as_ref().ok_or_else(|| {
                        GraphError::ComputationError(format!(
                            "节点`{}`的输入没有值，请先执行前向传播",
                            node.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let output = activations[idx].as_ref().ok_or_else(|| {
                GraphError::ComputationError(format!("节点`{}`没有值", node.name))
            })?;
            let ctx = BackwardContext {
                inputs: &input_acts,
                output,
                mask: masks[idx].as_ref(),
                batch_size: *batch_size,
            };
            let view = ParamView::new(&node.params, params);
            let Backprop {
                input_grads,
                param_grads,
            } = node.node.backward(grad, &view, &ctx)?;
            trace!(node = %node.name, frozen = node.frozen, "反向");

            // 2.1 参数梯度
            if param_grads.len() != node.params.len() {
                return Err(GraphError::ComputationError(format!(
                    "节点`{}`返回了{}个参数梯度，但它有{}个参数",
                    node.name,
                    param_grads.len(),
                    node.params.len()
                )));
            }
            for (slot, g) in node.params.iter().zip(&param_grads) {
                if g.shape() != slot.shape.as_slice() {
                    return Err(GraphError::ComputationError(format!(
                        "节点`{}`参数`{}`的梯度形状{:?}与参数形状{:?}不一致",
                        node.name,
                        slot.name,
                        g.shape(),
                        slot.shape
                    )));
                }
                if !node.frozen {
                    for (dst, src) in grads[slot.range()].iter_mut().zip(g.view().iter()) {
                        *dst += *src;
                    }
                }
            }

            // 2.2 传给各输入的梯度，多个消费者的贡献精确求和
            if input_grads.len() != node.inputs.len() {
                return Err(GraphError::ComputationError(format!(
                    "节点`{}`返回了{}个输入梯度，但它有{}个输入",
                    node.name,
                    input_grads.len(),
                    node.inputs.len()
                )));
            }
            for (k, (&p, g)) in node.inputs.iter().zip(input_grads).enumerate() {
                let expected = activations[p].as_ref().map(Tensor::shape).unwrap_or_default();
                if g.shape() != expected {
                    return Err(GraphError::ComputationError(format!(
                        "节点`{}`传给第{k}个输入的梯度形状{:?}与该输入的形状{expected:?}不一致",
                        node.name,
                        g.shape()
                    )));
                }
                accumulate(&mut epsilons[p], g);
            }
        }
        Ok(())
    }
}
