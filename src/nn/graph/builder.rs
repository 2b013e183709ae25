/*
 * @Date         : 2026-02-05
 * @Description  : 由描述符构建图：声明校验 -> 拓扑排序 -> 逐节点推断类型并插入形状适配器 -> 分配并初始化扁平参数缓冲
 */

use super::topo::topological_order;
use super::{Graph, GraphError, GraphNode, PassCache};
use crate::nn::descriptor::GraphDescriptor;
use crate::nn::nodes::{NodeRegistry, NodeType, ParamInit, ParamSlot, Preprocessor, TraitNode};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// 给节点自身报出的配置错误补上节点名
fn with_node_context(e: GraphError, name: &str) -> GraphError {
    match e {
        GraphError::Configuration(msg) => GraphError::Configuration(format!("节点`{name}`：{msg}")),
        other => other,
    }
}

impl Graph {
    /// 由描述符构建图（只能使用内置节点类型）
    pub fn build(desc: GraphDescriptor) -> Result<Self, GraphError> {
        Self::build_with_registry(desc, Arc::new(NodeRegistry::new()))
    }

    /// 由描述符构建图，自定义节点类型通过`registry`解析
    pub fn build_with_registry(
        desc: GraphDescriptor,
        registry: Arc<NodeRegistry>,
    ) -> Result<Self, GraphError> {
        // 1. 名字唯一、输出非空
        if desc.outputs.is_empty() {
            return Err(GraphError::Configuration(
                "至少需要指定一个输出节点".to_string(),
            ));
        }
        let mut declared_index = HashMap::new();
        for (i, node) in desc.nodes.iter().enumerate() {
            if node.name.is_empty() {
                return Err(GraphError::Configuration(format!("第{i}个节点的名字为空")));
            }
            if declared_index.insert(node.name.clone(), i).is_some() {
                return Err(GraphError::Configuration(format!(
                    "节点名`{}`重复",
                    node.name
                )));
            }
        }

        // 2. 边：两端都须已声明，同一消费者的输入槽不能重复
        let mut slots: Vec<Vec<(usize, usize)>> = vec![Vec::new(); desc.nodes.len()];
        for edge in &desc.edges {
            let lookup = |name: &str| {
                declared_index.get(name).copied().ok_or_else(|| {
                    GraphError::Configuration(format!(
                        "边`{}`->`{}`引用了未声明的节点`{name}`",
                        edge.from, edge.to
                    ))
                })
            };
            let (from, to) = (lookup(&edge.from)?, lookup(&edge.to)?);
            slots[to].push((edge.slot, from));
        }
        for (i, list) in slots.iter_mut().enumerate() {
            list.sort_by_key(|&(slot, _)| slot);
            if list.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(GraphError::Configuration(format!(
                    "节点`{}`的输入槽有重复",
                    desc.nodes[i].name
                )));
            }
        }
        let declared_inputs: Vec<Vec<usize>> = slots
            .iter()
            .map(|list| list.iter().map(|&(_, from)| from).collect())
            .collect();

        // 3. 实例化节点并检查输入个数
        let mut declared: Vec<Option<NodeType>> = Vec::with_capacity(desc.nodes.len());
        for (i, nd) in desc.nodes.iter().enumerate() {
            let node = NodeType::from_descriptor(&nd.node_type, &registry)
                .map_err(|e| with_node_context(e, &nd.name))?;
            let n_inputs = declared_inputs[i].len();
            if node.is_input() && n_inputs > 0 {
                return Err(GraphError::Configuration(format!(
                    "输入节点`{}`不能有输入边",
                    nd.name
                )));
            }
            if !node.is_input() && n_inputs == 0 {
                return Err(GraphError::Configuration(format!(
                    "节点`{}`没有任何输入，且不是输入节点",
                    nd.name
                )));
            }
            if n_inputs > 1 && !node.accepts_multiple_inputs() {
                return Err(GraphError::Configuration(format!(
                    "节点`{}`({})只接受1个输入，但声明了{n_inputs}个，多个输入请先经过合并顶点",
                    nd.name,
                    node.type_name()
                )));
            }
            declared.push(Some(node));
        }

        // 4. 输出节点须已声明且不重复
        let mut seen_outputs = HashSet::new();
        for output in &desc.outputs {
            if !declared_index.contains_key(output) {
                return Err(GraphError::Configuration(format!(
                    "输出节点`{output}`未声明"
                )));
            }
            if !seen_outputs.insert(output.as_str()) {
                return Err(GraphError::Configuration(format!(
                    "输出节点`{output}`重复"
                )));
            }
        }

        // 5. 拓扑排序
        let order = topological_order(&declared_inputs).map_err(|unresolved| {
            GraphError::CyclicGraph {
                unresolved: unresolved
                    .into_iter()
                    .map(|i| desc.nodes[i].name.clone())
                    .collect(),
            }
        })?;

        // 6. 按求值顺序推断类型，在类别不符的边上插入适配器
        let mut nodes: Vec<GraphNode> = Vec::with_capacity(desc.nodes.len());
        let mut new_index = vec![usize::MAX; desc.nodes.len()];
        let mut taken_names: HashSet<String> = declared_index.keys().cloned().collect();
        for &old in &order {
            let nd = &desc.nodes[old];
            let mut node = declared[old].take().ok_or_else(|| {
                GraphError::ComputationError(format!("节点`{}`被重复处理", nd.name))
            })?;
            let mut inputs = Vec::with_capacity(declared_inputs[old].len());
            let mut types = Vec::with_capacity(declared_inputs[old].len());
            for (slot, &producer_old) in declared_inputs[old].iter().enumerate() {
                let producer = new_index[producer_old];
                let producer_type = nodes[producer].output_type;
                let Some(kind) = node.input_kind() else {
                    inputs.push(producer);
                    types.push(producer_type);
                    continue;
                };
                match Preprocessor::resolve(producer_type, kind) {
                    Ok(None) => {
                        inputs.push(producer);
                        types.push(producer_type);
                    }
                    Ok(Some(mut adapter)) => {
                        let mut adapter_name = format!("{}->{}", nodes[producer].name, nd.name);
                        if declared_inputs[old].len() > 1 {
                            adapter_name = format!("{adapter_name}#{slot}");
                        }
                        if !taken_names.insert(adapter_name.clone()) {
                            return Err(GraphError::Configuration(format!(
                                "自动插入的适配器名`{adapter_name}`与已有节点重名"
                            )));
                        }
                        let adapter_type = adapter
                            .output_type(&[producer_type])
                            .map_err(|e| with_node_context(e, &adapter_name))?;
                        info!(
                            adapter = %adapter,
                            producer = %nodes[producer].name,
                            consumer = %nd.name,
                            "在{producer_type}与{kind}类输入之间插入适配器"
                        );
                        nodes.push(GraphNode {
                            name: adapter_name,
                            node: adapter.into(),
                            inputs: vec![producer],
                            frozen: false,
                            synthetic: true,
                            output_type: adapter_type,
                            params: Vec::new(),
                        });
                        inputs.push(nodes.len() - 1);
                        types.push(adapter_type);
                    }
                    Err(()) => {
                        return Err(GraphError::IncompatibleShape {
                            producer: nodes[producer].name.clone(),
                            consumer: nd.name.clone(),
                            from: producer_type,
                            to: kind,
                        });
                    }
                }
            }

            // 不插入适配器的顶点：所有输入须同属一个形状类别
            if node.input_kind().is_none() {
                if let Some(first) = types.first() {
                    if let Some((k, odd)) = types
                        .iter()
                        .enumerate()
                        .find(|(_, t)| t.kind() != first.kind())
                    {
                        return Err(GraphError::IncompatibleShape {
                            producer: nodes[inputs[k]].name.clone(),
                            consumer: nd.name.clone(),
                            from: *odd,
                            to: first.kind(),
                        });
                    }
                }
            }

            let output_type = node
                .output_type(&types)
                .map_err(|e| with_node_context(e, &nd.name))?;
            new_index[old] = nodes.len();
            nodes.push(GraphNode {
                name: nd.name.clone(),
                node,
                inputs,
                frozen: nd.frozen,
                synthetic: false,
                output_type,
                params: Vec::new(),
            });
        }

        // 7. 索引、消费者、输入/输出
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
        let mut consumers = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for &p in &node.inputs {
                consumers[p].push(i);
            }
        }
        let inputs = desc
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, nd)| matches!(nd.node_type, crate::nn::NodeTypeDescriptor::Input { .. }))
            .map(|(old, _)| new_index[old])
            .collect::<Vec<_>>();
        let outputs = desc
            .outputs
            .iter()
            .map(|name| index[name])
            .collect::<Vec<_>>();

        // 8. 分配扁平缓冲：节点按求值顺序，节点内按参数声明顺序
        let params = allocate_params(&mut nodes, desc.seed);
        let grads = vec![0.0; params.len()];

        debug!(
            graph = %desc.name,
            nodes = nodes.len(),
            params = params.len(),
            order = ?nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            "计算图构建完成"
        );

        Ok(Self {
            descriptor: desc,
            registry,
            nodes,
            index,
            inputs,
            outputs,
            consumers,
            params,
            grads,
            pass: PassCache::default(),
        })
    }
}

/// 为每个节点分配参数区间并用给定种子初始化，初始化顺序与缓冲布局一致，
/// 因此同一份声明、同一种子总能得到完全相同的初始参数
fn allocate_params(nodes: &mut [GraphNode], seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut params = Vec::new();
    for node in nodes.iter_mut() {
        for spec in node.node.param_specs() {
            let offset = params.len();
            match spec.init {
                ParamInit::Xavier { fan_in, fan_out } => {
                    let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                    let dist = Uniform::new_inclusive(-limit, limit);
                    params.extend((0..spec.len()).map(|_| dist.sample(&mut rng)));
                }
                ParamInit::Zeros => params.resize(offset + spec.len(), 0.0),
            }
            node.params.push(ParamSlot {
                name: spec.name,
                shape: spec.shape,
                offset,
            });
        }
    }
    params
}
