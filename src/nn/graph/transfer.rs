/*
 * @Date         : 2026-02-07
 * @Description  : 迁移学习：冻结节点、抽取特征提取子图，以及在已训练图的基础上改造出新图的构建器
 *
 * 冻结节点的参数在训练中保持逐位不变（其参数梯度被丢弃），但梯度照常穿过它流向上游。
 */

use super::{Graph, GraphError};
use crate::nn::descriptor::{GraphBuilder, GraphDescriptor, NodeTypeDescriptor};
use std::collections::HashSet;
use std::ops::Range;
use tracing::info;

impl Graph {
    /// 冻结/解冻单个节点
    pub fn set_frozen(&mut self, name: &str, frozen: bool) -> Result<(), GraphError> {
        let idx = self.node_index(name)?;
        self.nodes[idx].frozen = frozen;
        Ok(())
    }

    pub fn is_frozen(&self, name: &str) -> Result<bool, GraphError> {
        Ok(self.node(name)?.frozen)
    }

    /// 非冻结节点在扁平缓冲中的区间（相邻区间已合并），优化器只更新这些区间
    pub fn trainable_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for node in self.nodes.iter().filter(|n| !n.frozen) {
            let range = node.param_range();
            if range.is_empty() {
                continue;
            }
            match ranges.last_mut() {
                Some(last) if last.end == range.start => last.end = range.end,
                _ => ranges.push(range),
            }
        }
        ranges
    }

    /// 抽取以`cut`为唯一输出的特征提取子图（拷贝）：只保留`cut`及其上游，
    /// 所有保留节点被冻结，参数取自本图。本图不受影响
    pub fn extract_feature_subgraph(&self, cut: &str) -> Result<Self, GraphError> {
        let desc = self.feature_descriptor(cut)?;
        let mut sub = Self::build_with_registry(desc, self.registry.clone())?;
        sub.copy_params_from(self);
        info!(cut, params = sub.num_params(), "抽取特征提取子图");
        Ok(sub)
    }

    /// 同`extract_feature_subgraph`，但消耗本图，并复用其参数缓冲的内存
    pub fn into_feature_subgraph(self, cut: &str) -> Result<Self, GraphError> {
        let desc = self.feature_descriptor(cut)?;
        let mut sub = Self::build_with_registry(desc, self.registry.clone())?;
        sub.copy_params_from(&self);
        let Self { mut params, .. } = self;
        params.clear();
        params.extend_from_slice(&sub.params);
        sub.params = params;
        info!(cut, params = sub.num_params(), "抽取特征提取子图（消耗原图）");
        Ok(sub)
    }

    /// 以本图为源构建新图：可冻结特征提取部分、删除节点、追加新层
    pub fn transfer(&self) -> TransferBuilder<'_> {
        TransferBuilder {
            source: self,
            builder: GraphBuilder::from_descriptor(&self.descriptor()),
            feature_extractor: Vec::new(),
        }
    }

    fn feature_descriptor(&self, cut: &str) -> Result<GraphDescriptor, GraphError> {
        let desc = self.descriptor();
        // 只保留`cut`上游可达的输入，其余输入不属于子图
        let keep = ancestors(&desc, &[cut])?;
        let nodes = desc
            .nodes
            .into_iter()
            .filter(|n| keep.contains(&n.name))
            .map(|mut n| {
                n.frozen = true;
                n
            })
            .collect();
        let edges = desc
            .edges
            .into_iter()
            .filter(|e| keep.contains(&e.from) && keep.contains(&e.to))
            .collect();
        Ok(GraphDescriptor {
            nodes,
            edges,
            outputs: vec![cut.to_string()],
            ..desc
        })
    }
}

/// `roots`及其所有上游节点（沿输入边反向可达）
fn ancestors(desc: &GraphDescriptor, roots: &[&str]) -> Result<HashSet<String>, GraphError> {
    let mut found = HashSet::new();
    let mut stack = Vec::new();
    for &root in roots {
        if desc.node(root).is_none() {
            return Err(GraphError::UnknownNode(root.to_string()));
        }
        stack.push(root.to_string());
    }
    while let Some(name) = stack.pop() {
        if !found.insert(name.clone()) {
            continue;
        }
        stack.extend(
            desc.edges
                .iter()
                .filter(|e| e.to == name)
                .map(|e| e.from.clone()),
        );
    }
    Ok(found)
}

/// 迁移学习构建器
///
/// ```ignore
/// let mut new_graph = trained
///     .transfer()
///     .set_feature_extractor(&["dense1"])
///     .remove_node_and_descendants("out")
///     .add_layer(
///         "new_out",
///         NodeTypeDescriptor::output(3, Activation::Softmax, LossFunction::Mcxent),
///         &["dense1"],
///     )
///     .set_outputs(&["new_out"])
///     .build()?;
/// ```
///
/// 各特征提取切点的上游（含切点本身）全部冻结；同名、同形状的参数从源图拷贝，新增的层按种子初始化
#[derive(Debug)]
pub struct TransferBuilder<'a> {
    source: &'a Graph,
    builder: GraphBuilder,
    feature_extractor: Vec<String>,
}

impl TransferBuilder<'_> {
    /// 指定特征提取切点，可以有多个
    pub fn set_feature_extractor(mut self, cuts: &[&str]) -> Self {
        self.feature_extractor = cuts.iter().map(|s| s.to_string()).collect();
        self
    }

    /// 删除节点及其所有下游节点（并从输出列表中移除）
    pub fn remove_node_and_descendants(mut self, name: &str) -> Self {
        self.builder.remove_node_and_descendants(name);
        self
    }

    pub fn add_layer(mut self, name: &str, layer: NodeTypeDescriptor, inputs: &[&str]) -> Self {
        self.builder = self.builder.add_layer(name, layer, inputs);
        self
    }

    pub fn add_vertex(mut self, name: &str, vertex: NodeTypeDescriptor, inputs: &[&str]) -> Self {
        self.builder = self.builder.add_vertex(name, vertex, inputs);
        self
    }

    pub fn set_outputs(mut self, names: &[&str]) -> Self {
        self.builder = self.builder.set_outputs(names);
        self
    }

    pub fn build(mut self) -> Result<Graph, GraphError> {
        let desc = self.builder.descriptor()?;
        let cuts = self
            .feature_extractor
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        let frozen = ancestors(&desc, &cuts)?;
        self.builder.set_frozen(&frozen);
        let desc = self.builder.descriptor()?;
        let mut graph = Graph::build_with_registry(desc, self.source.registry().clone())?;
        let copied = graph.copy_params_from(self.source);
        info!(
            frozen = frozen.len(),
            copied,
            params = graph.num_params(),
            "迁移学习构建完成"
        );
        Ok(graph)
    }
}
