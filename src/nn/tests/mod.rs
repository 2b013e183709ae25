mod criterion;
mod custom_node;
mod mask;
mod model_io;
mod params;
mod training;

use crate::nn::{
    Activation, Graph, GraphBuilder, InputType, LossFunction, MultiDataSet, NodeTypeDescriptor,
};
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// in(4) -> d1(3, tanh) -> d2(2, tanh) -> out(2, softmax + 交叉熵)
/// 参数个数：d1 4*3+3=15，d2 3*2+2=8，out 2*2+2=6
fn chain_graph() -> Graph {
    GraphBuilder::new()
        .name("chain")
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(4)])
        .add_layer("d1", NodeTypeDescriptor::dense(3, Activation::Tanh), &["in"])
        .add_layer("d2", NodeTypeDescriptor::dense(2, Activation::Tanh), &["d1"])
        .add_layer(
            "out",
            NodeTypeDescriptor::output(2, Activation::Softmax, LossFunction::Mcxent),
            &["d2"],
        )
        .set_outputs(&["out"])
        .build()
        .unwrap()
}

/// `[rows, n_class]`的独热标签
fn one_hot(classes: &[usize], n_class: usize) -> Tensor {
    let mut data = vec![0.0; classes.len() * n_class];
    for (row, &c) in classes.iter().enumerate() {
        data[row * n_class + c] = 1.0;
    }
    Tensor::new(&data, &[classes.len(), n_class])
}

fn random_tensor(shape: &[usize], seed: u64) -> Tensor {
    Tensor::new_uniform(-1.0, 1.0, shape, &mut StdRng::seed_from_u64(seed))
}

/// 4个样本的分类数据，对应`chain_graph`
fn chain_data() -> MultiDataSet {
    MultiDataSet::single(random_tensor(&[4, 4], 7), one_hot(&[0, 1, 1, 0], 2))
}

/// 用中心差分逐个检查扁平梯度缓冲中的解析梯度，检查完后恢复原参数
fn assert_gradients_match(graph: &mut Graph, data: &MultiDataSet) {
    const EPS: f32 = 1e-2;
    graph.compute_gradient_and_score(data).unwrap();
    let analytic = graph.flat_gradients().to_vec();
    let base = graph.flat_params().to_vec();
    assert!(analytic.iter().any(|g| g.abs() > 1e-6), "梯度全为0");

    let mut params = base.clone();
    for i in 0..base.len() {
        params[i] = base[i] + EPS;
        graph.set_flat_params(&params).unwrap();
        let plus = graph.score(data).unwrap();
        params[i] = base[i] - EPS;
        graph.set_flat_params(&params).unwrap();
        let minus = graph.score(data).unwrap();
        params[i] = base[i];

        let numeric = (plus - minus) / (2.0 * EPS);
        assert!(
            (numeric - analytic[i]).abs() <= 1e-2 * (1.0 + analytic[i].abs()),
            "第{i}个参数的梯度不符：数值梯度{numeric}，解析梯度{}",
            analytic[i]
        );
    }
    graph.set_flat_params(&base).unwrap();
}
