use crate::assert_err;
use crate::nn::{Activation, GraphBuilder, GraphError, InputType, NodeTypeDescriptor};
use crate::tensor::Tensor;

#[test]
fn test_flat_buffer_layout() {
    let graph = super::chain_graph();
    assert_eq!(graph.num_params(), 29);
    assert_eq!(graph.flat_params().len(), 29);
    assert_eq!(graph.flat_gradients().len(), 29);
    assert_eq!(graph.node_num_params("in").unwrap(), 0);
    assert_eq!(graph.node_num_params("d1").unwrap(), 15);
    assert_eq!(graph.node_num_params("d2").unwrap(), 8);
    assert_eq!(graph.node_num_params("out").unwrap(), 6);

    let keys = graph
        .param_table()
        .into_iter()
        .map(|(k, _)| k)
        .collect::<Vec<_>>();
    assert_eq!(keys, ["d1_W", "d1_b", "d2_W", "d2_b", "out_W", "out_b"]);

    // 参数表与扁平缓冲按同一顺序排列
    let concatenated = graph
        .param_table()
        .into_iter()
        .flat_map(|(_, t)| t.to_vec())
        .collect::<Vec<_>>();
    assert_eq!(concatenated, graph.flat_params());
}

#[test]
fn test_set_flat_params() {
    let mut graph = super::chain_graph();
    let values = (0..29).map(|v| v as f32).collect::<Vec<_>>();
    graph.set_flat_params(&values).unwrap();
    assert_eq!(graph.flat_params(), values.as_slice());
    assert_eq!(
        graph.get_param("d1", "b").unwrap(),
        Tensor::new(&[12.0, 13.0, 14.0], &[1, 3])
    );

    // 长度不符时报错，原参数不变
    assert_err!(
        graph.set_flat_params(&[0.0; 3]),
        GraphError::ParameterCountMismatch(29, 3)
    );
    assert_eq!(graph.flat_params(), values.as_slice());
}

#[test]
fn test_get_and_set_param_by_name() {
    let mut graph = super::chain_graph();
    let w = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
    graph.set_param("d2", "W", &w).unwrap();
    assert_eq!(graph.get_param("d2", "W").unwrap(), w);
    assert_eq!(&graph.flat_params()[15..21], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    assert_err!(
        graph.set_param("d2", "W", &Tensor::zeros(&[2, 3])),
        GraphError::InvalidOperation("参数`d2_W`的形状为[3, 2]，不能用形状为[2, 3]的张量覆盖")
    );
    assert_err!(
        graph.get_param("d2", "gamma"),
        GraphError::InvalidOperation("节点`d2`没有名为`gamma`的参数")
    );
    assert_err!(graph.get_param("ghost", "W"), GraphError::UnknownNode("ghost"));
}

#[test]
fn test_views_alias_the_flat_buffer() {
    let mut graph = super::chain_graph();
    {
        let mut view = graph.param_view_mut("out", "b").unwrap();
        view[[0, 1]] = 42.0;
    }
    assert_eq!(graph.flat_params()[28], 42.0);
    assert_eq!(graph.param_view("out", "b").unwrap()[[0, 1]], 42.0);
    assert_eq!(graph.param_view("d1", "W").unwrap().shape(), &[4, 3]);

    graph
        .compute_gradient_and_score(&super::chain_data())
        .unwrap();
    let (params, grads) = graph.view_for("d2", "W").unwrap();
    assert_eq!(params.shape(), grads.shape());
    assert_eq!(
        grads.iter().copied().collect::<Vec<_>>(),
        graph.flat_gradients()[15..21].to_vec()
    );
    assert_eq!(graph.grad_view("d2", "b").unwrap().len(), 2);
}

#[test]
fn test_initialisation_is_seeded() {
    let a = super::chain_graph();
    let b = super::chain_graph();
    assert_eq!(a.flat_params(), b.flat_params());

    let other = GraphBuilder::from_descriptor(&a.descriptor())
        .seed(7)
        .build()
        .unwrap();
    assert_ne!(a.flat_params(), other.flat_params());

    // Xavier：|w| <= sqrt(6 / (fan_in + fan_out))，偏置初始化为0
    let limit = (6.0f32 / 7.0).sqrt();
    assert!(a.param_view("d1", "W").unwrap().iter().all(|w| w.abs() <= limit));
    assert!(a.param_view("d1", "b").unwrap().iter().all(|&b| b == 0.0));
    assert!(a.flat_gradients().iter().all(|&g| g == 0.0));
}

#[test]
fn test_adapters_and_vertices_have_no_params() {
    let graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::recurrent(3)])
        .add_layer("dense", NodeTypeDescriptor::dense(2, Activation::Relu), &["in"])
        .add_vertex("sub", NodeTypeDescriptor::Subset { from: 0, to: 0 }, &["dense"])
        .set_outputs(&["sub"])
        .build()
        .unwrap();
    assert_eq!(graph.node_num_params("in->dense").unwrap(), 0);
    assert_eq!(graph.node_num_params("sub").unwrap(), 0);
    assert_eq!(graph.num_params(), 8);
    assert_eq!(graph.param_table().len(), 2);
}
