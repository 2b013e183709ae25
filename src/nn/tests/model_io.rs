use super::{chain_data, chain_graph, random_tensor};
use crate::assert_err;
use crate::nn::{
    Activation, Adam, Graph, GraphBuilder, GraphError, InputType, NodeTypeDescriptor,
};
use tempfile::tempdir;

#[test]
fn test_save_and_load_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain");

    let mut graph = chain_graph();
    let mut adam = Adam::new(0.01);
    for _ in 0..5 {
        graph.fit(&chain_data(), &mut adam).unwrap();
    }
    graph.set_frozen("d2", true).unwrap();
    graph.save_model(&path).unwrap();
    assert!(path.with_extension("json").exists());
    assert!(path.with_extension("bin").exists());

    let mut loaded = Graph::load_model(&path).unwrap();
    assert_eq!(loaded.name(), "chain");
    assert_eq!(loaded.flat_params(), graph.flat_params());
    assert_eq!(loaded.descriptor(), graph.descriptor());
    assert_eq!(loaded.iteration_count(), 5);
    assert!(loaded.is_frozen("d2").unwrap());
    assert!(!loaded.is_frozen("d1").unwrap());

    let x = random_tensor(&[3, 4], 21);
    assert_eq!(
        loaded.output(std::slice::from_ref(&x)).unwrap(),
        graph.output(&[x]).unwrap()
    );
}

#[test]
fn test_load_params_into_other_structure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain.bin");
    chain_graph().save_params(&path).unwrap();

    let mut other = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(1)])
        .add_layer("dense", NodeTypeDescriptor::dense(1, Activation::Identity), &["in"])
        .set_outputs(&["dense"])
        .build()
        .unwrap();
    let before = other.flat_params().to_vec();
    assert_err!(other.load_params(&path), GraphError::ParameterCountMismatch(2, 29));
    assert_eq!(other.flat_params(), before.as_slice());

    // 结构相同的图可以载入
    let mut same = GraphBuilder::from_descriptor(&chain_graph().descriptor())
        .seed(99)
        .build()
        .unwrap();
    same.load_params(&path).unwrap();
    assert_eq!(same.flat_params(), chain_graph().flat_params());
}

#[test]
fn test_corrupt_params_file() {
    let dir = tempdir().unwrap();
    let mut graph = chain_graph();

    let garbage = dir.path().join("garbage.bin");
    std::fs::write(&garbage, b"hello").unwrap();
    assert_err!(graph.load_params(&garbage), GraphError::Serialization(_));

    // 布局正确但魔数不对
    let foreign = dir.path().join("foreign.bin");
    let bytes = bincode::serialize(&(*b"NOPE", 1u32, vec![0.0f32; 29])).unwrap();
    std::fs::write(&foreign, bytes).unwrap();
    assert_err!(
        graph.load_params(&foreign),
        GraphError::Serialization(msg) if msg.ends_with("不是参数文件")
    );

    let newer = dir.path().join("newer.bin");
    let bytes = bincode::serialize(&(*b"OGPB", 2u32, vec![0.0f32; 29])).unwrap();
    std::fs::write(&newer, bytes).unwrap();
    assert_err!(
        graph.load_params(&newer),
        GraphError::Serialization("不支持的参数文件版本2（当前版本为1）")
    );

    assert_err!(
        Graph::load_model(dir.path().join("missing")),
        GraphError::Serialization(msg) if msg.starts_with("读取描述文件")
    );
    assert_eq!(graph.flat_params(), chain_graph().flat_params());
}

#[test]
fn test_custom_nodes_need_the_registry_to_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scaled");
    let graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(2)])
        .add_layer(
            "scale",
            NodeTypeDescriptor::custom("Scale", serde_json::json!({ "note": "test" })),
            &["in"],
        )
        .set_outputs(&["scale"])
        .build_with_registry(super::custom_node::scale_registry())
        .unwrap();
    graph.save_model(&path).unwrap();

    assert_err!(
        Graph::load_model(&path),
        GraphError::Configuration("节点`scale`：未注册的自定义节点类型`Scale`")
    );
    let loaded =
        Graph::load_model_with_registry(&path, super::custom_node::scale_registry()).unwrap();
    assert_eq!(loaded.flat_params(), graph.flat_params());
    assert_eq!(loaded.descriptor(), graph.descriptor());
}

#[test]
fn test_descriptor_without_iteration_count_starts_at_zero() {
    let mut graph = chain_graph();
    graph.fit(&chain_data(), &mut Adam::new(0.01)).unwrap();
    let mut json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();
    assert_eq!(json["iteration_count"], 1);
    json.as_object_mut().unwrap().remove("iteration_count");

    let desc = crate::nn::GraphDescriptor::from_json(&json.to_string()).unwrap();
    assert_eq!(desc.iteration_count, 0);
    let loaded = Graph::build(desc).unwrap();
    assert_eq!(loaded.iteration_count(), 0);
}
