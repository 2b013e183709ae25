//! 自定义节点测试
//!
//! 通过`NodeRegistry`注册的节点与内置节点走同一套前向/反向流程，这里同时检查扇出求和、
//! 多输入适配器以及参数梯度的形状校验。

use crate::assert_err;
use crate::nn::nodes::as_matrix;
use crate::nn::{
    Backprop, BackwardContext, CustomLayer, ForwardContext, GraphBuilder, GraphError, InputType,
    NodeRegistry, NodeTypeDescriptor, ParamSpec, ParamView, PassState, ShapeKind, TraitNode,
};
use crate::tensor::Tensor;
use std::sync::{Arc, Mutex};

// ========== 测试用的自定义节点 ==========

/// y = a * x，唯一的参数`a`形状为[1, 1]
#[derive(Debug, Clone)]
pub(super) struct Scale;

impl TraitNode for Scale {
    fn type_name(&self) -> &str {
        "Scale"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::FeedForward)
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        match inputs {
            [input] => Ok(*input),
            _ => Err(GraphError::Configuration("Scale只需要1个输入".to_string())),
        }
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::weight("a", &[1, 1], 1, 1)]
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let a = params.matrix("a")?[[0, 0]];
        Ok(Tensor::from_array(inputs[0].view().mapv(|x| a * x)))
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let a = params.matrix("a")?[[0, 0]];
        let x = ctx.inputs[0];
        let da = grad
            .view()
            .iter()
            .zip(x.view().iter())
            .map(|(g, x)| g * x)
            .sum::<f32>();
        Ok(Backprop {
            input_grads: vec![Tensor::from_array(grad.view().mapv(|g| a * g))],
            param_grads: vec![Tensor::new(&[da], &[1, 1])],
        })
    }
}

impl CustomLayer for Scale {
    fn clone_box(&self) -> Box<dyn CustomLayer> {
        Box::new(self.clone())
    }
}

fn make_scale(_config: &serde_json::Value) -> Result<Box<dyn CustomLayer>, GraphError> {
    Ok(Box::new(Scale))
}

pub(super) fn scale_registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    registry.register("Scale", make_scale);
    Arc::new(registry)
}

/// 恒等节点，记下反向传播时收到的梯度
#[derive(Debug, Clone)]
struct GradRecorder {
    seen: Arc<Mutex<Option<Tensor>>>,
}

impl TraitNode for GradRecorder {
    fn type_name(&self) -> &str {
        "GradRecorder"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        None
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        Ok(inputs[0])
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        Ok(inputs[0].clone())
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        _ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        *self.seen.lock().unwrap() = Some(grad.clone());
        Ok(Backprop::inputs_only(vec![grad.clone()]))
    }
}

impl CustomLayer for GradRecorder {
    fn clone_box(&self) -> Box<dyn CustomLayer> {
        Box::new(self.clone())
    }
}

/// 把两个输入逐元素相加，要求前馈类输入
#[derive(Debug, Clone)]
struct Pair;

impl TraitNode for Pair {
    fn type_name(&self) -> &str {
        "Pair"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::FeedForward)
    }

    fn accepts_multiple_inputs(&self) -> bool {
        true
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        match inputs {
            [a, b] if a == b => Ok(*a),
            _ => Err(GraphError::Configuration(format!(
                "Pair需要2个同样的输入，但得到{inputs:?}"
            ))),
        }
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        Ok(inputs[0] + inputs[1])
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        _params: &ParamView<'_>,
        _ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        Ok(Backprop::inputs_only(vec![grad.clone(), grad.clone()]))
    }
}

impl CustomLayer for Pair {
    fn clone_box(&self) -> Box<dyn CustomLayer> {
        Box::new(self.clone())
    }
}

/// y = x·W，反向传播时故意返回转置后的`W`梯度
#[derive(Debug, Clone)]
struct TransposedGrad;

impl TraitNode for TransposedGrad {
    fn type_name(&self) -> &str {
        "TransposedGrad"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        Some(ShapeKind::FeedForward)
    }

    fn output_type(&mut self, _inputs: &[InputType]) -> Result<InputType, GraphError> {
        Ok(InputType::feed_forward(3))
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::weight("W", &[2, 3], 2, 3)]
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let x = as_matrix(inputs[0].view(), "x")?;
        let w = params.matrix("W")?;
        Ok(Tensor::from_array(x.dot(&w).into_dyn()))
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        params: &ParamView<'_>,
        ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        let x = as_matrix(ctx.inputs[0].view(), "x")?;
        let g = as_matrix(grad.view(), "grad")?;
        let w = params.matrix("W")?;
        // [2, 3]的梯度被转置成[3, 2]，元素个数不变
        let dw = x.t().dot(&g).reversed_axes();
        Ok(Backprop {
            input_grads: vec![Tensor::from_array(g.dot(&w.t()).into_dyn())],
            param_grads: vec![Tensor::from_array(dw.into_dyn())],
        })
    }
}

impl CustomLayer for TransposedGrad {
    fn clone_box(&self) -> Box<dyn CustomLayer> {
        Box::new(self.clone())
    }
}

// ========== 测试 ==========

#[test]
fn test_custom_node_with_params() {
    let mut graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(3)])
        .add_layer(
            "scale",
            NodeTypeDescriptor::custom("Scale", serde_json::Value::Null),
            &["in"],
        )
        .set_outputs(&["scale"])
        .build_with_registry(scale_registry())
        .unwrap();
    assert_eq!(graph.num_params(), 1);
    assert_eq!(graph.node_type_name("scale").unwrap(), "Scale");

    graph.set_flat_params(&[2.0]).unwrap();
    let y = graph
        .output_single(&Tensor::new(&[1.0, -2.0, 3.0], &[1, 3]))
        .unwrap();
    assert_eq!(y, Tensor::new(&[2.0, -4.0, 6.0], &[1, 3]));

    graph
        .backprop_gradient(&[Tensor::new(&[1.0, 1.0, 1.0], &[1, 3])])
        .unwrap();
    // dL/da = Σx
    assert_eq!(graph.flat_gradients(), &[2.0]);
    assert_eq!(
        graph.gradient_of("in").unwrap(),
        Some(&Tensor::new(&[2.0, 2.0, 2.0], &[1, 3]))
    );
}

#[test]
fn test_unregistered_custom_type() {
    let result = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(3)])
        .add_layer(
            "scale",
            NodeTypeDescriptor::custom("Scale", serde_json::Value::Null),
            &["in"],
        )
        .set_outputs(&["scale"])
        .build();
    assert_err!(
        result,
        GraphError::Configuration("节点`scale`：未注册的自定义节点类型`Scale`")
    );
}

#[test]
fn test_fan_out_gradients_are_summed() {
    let seen = Arc::new(Mutex::new(None));
    let mut registry = NodeRegistry::new();
    let recorder_seen = Arc::clone(&seen);
    registry.register("GradRecorder", move |_: &serde_json::Value| {
        Ok(Box::new(GradRecorder {
            seen: Arc::clone(&recorder_seen),
        }) as Box<dyn CustomLayer>)
    });
    assert!(registry.contains("GradRecorder"));

    let mut graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(2)])
        .add_vertex(
            "recorder",
            NodeTypeDescriptor::custom("GradRecorder", serde_json::Value::Null),
            &["in"],
        )
        .add_vertex("left", NodeTypeDescriptor::Subset { from: 0, to: 1 }, &["recorder"])
        .add_vertex("right", NodeTypeDescriptor::Subset { from: 0, to: 1 }, &["recorder"])
        .set_outputs(&["left", "right"])
        .build_with_registry(Arc::new(registry))
        .unwrap();
    assert_eq!(graph.consumers_of("recorder").unwrap(), vec!["left", "right"]);

    graph
        .feed_forward(&[Tensor::new(&[0.3, 0.7], &[1, 2])], true)
        .unwrap();
    graph
        .backprop_gradient(&[
            Tensor::new(&[1.0, 2.0], &[1, 2]),
            Tensor::new(&[10.0, 20.0], &[1, 2]),
        ])
        .unwrap();

    let expected = Tensor::new(&[11.0, 22.0], &[1, 2]);
    assert_eq!(seen.lock().unwrap().as_ref(), Some(&expected));
    assert_eq!(graph.gradient_of("recorder").unwrap(), Some(&expected));
    assert_eq!(graph.gradient_of("in").unwrap(), Some(&expected));
}

#[test]
fn test_multi_input_custom_node_adapters_carry_slot() {
    let mut registry = NodeRegistry::new();
    registry.register("Pair", |_: &serde_json::Value| {
        Ok(Box::new(Pair) as Box<dyn CustomLayer>)
    });
    let mut graph = GraphBuilder::new()
        .add_inputs(&["a", "b"])
        .set_input_types(&[InputType::recurrent(2), InputType::recurrent(2)])
        .add_vertex(
            "pair",
            NodeTypeDescriptor::custom("Pair", serde_json::Value::Null),
            &["a", "b"],
        )
        .set_outputs(&["pair"])
        .build_with_registry(Arc::new(registry))
        .unwrap();
    assert_eq!(
        graph.evaluation_order(),
        vec!["a", "b", "a->pair#0", "b->pair#1", "pair"]
    );
    assert!(graph.is_synthetic("b->pair#1").unwrap());
    assert_eq!(graph.node_inputs("pair").unwrap(), vec!["a->pair#0", "b->pair#1"]);

    // [b=1, n=2, T=3] 折叠为 [3, 2]
    let x = Tensor::ones(&[1, 2, 3]);
    let out = graph.output(&[x.clone(), x]).unwrap();
    assert_eq!(out[0], Tensor::new(&[2.0; 6], &[3, 2]));
}

#[test]
fn test_param_gradient_shape_must_match_param() {
    let mut registry = NodeRegistry::new();
    registry.register("TransposedGrad", |_: &serde_json::Value| {
        Ok(Box::new(TransposedGrad) as Box<dyn CustomLayer>)
    });
    let mut graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(2)])
        .add_vertex(
            "proj",
            NodeTypeDescriptor::custom("TransposedGrad", serde_json::Value::Null),
            &["in"],
        )
        .set_outputs(&["proj"])
        .build_with_registry(Arc::new(registry))
        .unwrap();
    assert_eq!(graph.num_params(), 6);

    graph
        .feed_forward(&[Tensor::new(&[0.5, -1.0, 2.0, 0.25], &[2, 2])], true)
        .unwrap();
    assert_err!(
        graph.backprop_gradient(&[Tensor::ones(&[2, 3])]),
        GraphError::ComputationError("节点`proj`参数`W`的梯度形状[3, 2]与参数形状[2, 3]不一致")
    );
    assert_eq!(graph.pass_state(), PassState::Idle);
    assert!(graph.flat_gradients().iter().all(|&g| g == 0.0));
}
