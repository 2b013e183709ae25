//! 训练相关测试：分数、逐样本打分、单步训练与训练步数

use super::{chain_data, chain_graph, random_tensor};
use crate::assert_err;
use crate::nn::{
    Activation, Adam, GraphBuilder, GraphError, InputType, LossFunction, MultiDataSet,
    NodeTypeDescriptor, Optimizer, PassState, Sgd,
};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

fn linear_graph() -> crate::nn::Graph {
    GraphBuilder::new()
        .add_inputs(&["x"])
        .set_input_types(&[InputType::feed_forward(1)])
        .add_layer(
            "y",
            NodeTypeDescriptor::output(1, Activation::Identity, LossFunction::Mse),
            &["x"],
        )
        .set_outputs(&["y"])
        .build()
        .unwrap()
}

#[test]
fn test_sgd_fits_a_line() {
    // y = 2x + 1
    let x = Tensor::new(&[-1.0, -0.5, 0.5, 1.0], &[4, 1]);
    let y = Tensor::new(&[-1.0, 0.0, 2.0, 3.0], &[4, 1]);
    let data = MultiDataSet::single(x, y);
    let mut graph = linear_graph();
    let mut sgd = Sgd::new(0.1);
    assert_eq!(sgd.learning_rate(), 0.1);

    let before = graph.score(&data).unwrap();
    let first = graph.fit(&data, &mut sgd).unwrap();
    // fit返回的是更新前的分数
    assert_abs_diff_eq!(first, before, epsilon = 1e-6);

    for _ in 0..500 {
        graph.fit(&data, &mut sgd).unwrap();
    }
    assert!(graph.score(&data).unwrap() < 1e-3);
    assert_abs_diff_eq!(graph.get_param("y", "W").unwrap().to_vec()[0], 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(graph.get_param("y", "b").unwrap().to_vec()[0], 1.0, epsilon = 1e-2);
}

#[test]
fn test_adam_reduces_classification_loss() {
    let data = chain_data();
    let mut graph = chain_graph();
    let mut adam = Adam::new(0.05);

    let initial = graph.score(&data).unwrap();
    for _ in 0..500 {
        graph.fit(&data, &mut adam).unwrap();
    }
    let last = graph.score(&data).unwrap();
    println!("Adam训练：{initial} -> {last}");
    assert!(last < initial / 10.0);
    assert!(last < 0.05);
}

#[test]
fn test_score_does_not_touch_params() {
    let data = chain_data();
    let mut graph = chain_graph();
    let params = graph.flat_params().to_vec();
    let a = graph.score(&data).unwrap();
    let b = graph.score(&data).unwrap();
    assert_eq!(a, b);
    assert_eq!(graph.flat_params(), params.as_slice());
    assert_eq!(graph.pass_state(), PassState::ForwardComplete);
}

#[test]
fn test_label_mask_excludes_rows() {
    let data = chain_data();
    let masked = data
        .clone()
        .with_labels_masks(vec![Some(Tensor::new(&[1.0, 1.0, 0.0, 0.0], &[4, 1]))]);
    let head = MultiDataSet::single(
        data.features[0].narrow(0, 0, 2).unwrap(),
        data.labels[0].narrow(0, 0, 2).unwrap(),
    );

    let mut graph = chain_graph();
    let masked_score = graph.score(&masked).unwrap();
    let head_score = graph.score(&head).unwrap();
    // 分数按样本数（4对2）取平均
    assert_abs_diff_eq!(masked_score, head_score / 2.0, epsilon = 1e-6);
}

#[test]
fn test_training_errors() {
    let mut graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::feed_forward(2)])
        .add_layer(
            "out",
            NodeTypeDescriptor::output_without_loss(2, Activation::Identity),
            &["in"],
        )
        .set_outputs(&["out"])
        .build()
        .unwrap();
    let data = MultiDataSet::single(random_tensor(&[2, 2], 1), random_tensor(&[2, 2], 2));
    assert_err!(
        graph.fit(&data, &mut Sgd::new(0.1)),
        GraphError::InvalidOperation("输出节点`out`没有损失函数，请改用backprop_gradient注入误差")
    );
    assert_eq!(graph.pass_state(), PassState::Idle);

    let mut graph = chain_graph();
    let no_labels = MultiDataSet::new(vec![random_tensor(&[2, 4], 1)], Vec::new());
    assert_err!(
        graph.compute_gradient_and_score(&no_labels),
        GraphError::InvalidOperation("图有1个输出节点，但提供了0个标签张量")
    );

    // 没有完成反向传播时不能更新参数
    let mut sgd = Sgd::new(0.1);
    assert_err!(
        sgd.update(&mut graph),
        GraphError::InvalidOperation("更新参数前须先完成一轮反向传播")
    );
    graph.score(&chain_data()).unwrap();
    assert_err!(
        Adam::new(0.1).update(&mut graph),
        GraphError::InvalidOperation("更新参数前须先完成一轮反向传播")
    );
}

#[test]
fn test_score_examples_per_row() {
    let mut graph = linear_graph();
    graph.set_param("y", "W", &Tensor::new(&[1.0], &[1, 1])).unwrap();
    graph.set_param("y", "b", &Tensor::new(&[0.0], &[1, 1])).unwrap();
    let data = MultiDataSet::single(
        Tensor::new(&[1.0, 2.0, -3.0], &[3, 1]),
        Tensor::zeros(&[3, 1]),
    );
    let per_example = graph.score_examples(&data).unwrap();
    assert_eq!(per_example, Tensor::new(&[1.0, 4.0, 9.0], &[3, 1]));
    assert_abs_diff_eq!(graph.score(&data).unwrap(), 14.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_score_examples_agree_with_score() {
    let mut graph = chain_graph();
    let x = random_tensor(&[3, 4], 41);
    let labels = super::one_hot(&[0, 1, 1], 2);
    let data = MultiDataSet::single(x.clone(), labels.clone());
    let per_example = graph.score_examples(&data).unwrap();
    assert_eq!(per_example.shape(), &[3, 1]);
    let rows = per_example.to_vec();
    assert_abs_diff_eq!(
        rows.iter().sum::<f32>() / 3.0,
        graph.score(&data).unwrap(),
        epsilon = 1e-6
    );

    // 每行等于该样本单独打分
    let (x, labels) = (x.to_vec(), labels.to_vec());
    for (i, row) in rows.iter().enumerate() {
        let single = MultiDataSet::single(
            Tensor::new(&x[i * 4..(i + 1) * 4], &[1, 4]),
            Tensor::new(&labels[i * 2..(i + 1) * 2], &[1, 2]),
        );
        assert_abs_diff_eq!(*row, graph.score(&single).unwrap(), epsilon = 1e-6);
    }

    let no_labels = MultiDataSet::new(vec![random_tensor(&[2, 4], 1)], Vec::new());
    assert_err!(
        graph.score_examples(&no_labels),
        GraphError::InvalidOperation("图有1个输出节点，但提供了0个标签张量")
    );
    assert_eq!(graph.pass_state(), PassState::Idle);
}

#[test]
fn test_score_examples_sum_outputs_and_respect_label_masks() {
    let mut graph = GraphBuilder::new()
        .add_inputs(&["in"])
        .set_input_types(&[InputType::recurrent(2)])
        .add_layer("rnn", NodeTypeDescriptor::simple_rnn(3, Activation::Tanh), &["in"])
        .add_layer(
            "a",
            NodeTypeDescriptor::rnn_output(2, Activation::Softmax, LossFunction::Mcxent),
            &["rnn"],
        )
        .add_layer(
            "b",
            NodeTypeDescriptor::rnn_output(2, Activation::Identity, LossFunction::Mse),
            &["rnn"],
        )
        .set_outputs(&["a", "b"])
        .build()
        .unwrap();
    let x = random_tensor(&[2, 2, 3], 42);
    let mut t = vec![0.0; 12];
    for (b, k, step) in [(0, 0, 0), (0, 1, 1), (0, 0, 2), (1, 1, 0), (1, 1, 1), (1, 0, 2)] {
        t[b * 6 + k * 3 + step] = 1.0;
    }
    let labels = Tensor::new(&t, &[2, 2, 3]);
    let mask = Tensor::new(&[1.0, 1.0, 1.0, 0.0, 0.0, 0.0], &[2, 3]);

    let both = MultiDataSet::new(vec![x.clone()], vec![labels.clone(), labels.clone()]);
    let per_example = graph.score_examples(&both).unwrap().to_vec();
    let a = MultiDataSet::new(vec![x.clone()], vec![labels.clone(), labels.clone()])
        .with_labels_masks(vec![None, Some(Tensor::zeros(&[2, 3]))]);
    let only_a = graph.score_examples(&a).unwrap().to_vec();
    let b = MultiDataSet::new(vec![x.clone()], vec![labels.clone(), labels.clone()])
        .with_labels_masks(vec![Some(Tensor::zeros(&[2, 3])), None]);
    let only_b = graph.score_examples(&b).unwrap().to_vec();
    for i in 0..2 {
        assert!(only_a[i] > 0.0 && only_b[i] > 0.0);
        assert_abs_diff_eq!(per_example[i], only_a[i] + only_b[i], epsilon = 1e-5);
    }

    // 第二个样本的所有时间步都被掩码，分数为0
    let masked = MultiDataSet::new(vec![x], vec![labels.clone(), labels])
        .with_labels_masks(vec![Some(mask.clone()), Some(mask)]);
    let masked = graph.score_examples(&masked).unwrap().to_vec();
    assert_eq!(masked[1], 0.0);
    assert_abs_diff_eq!(masked[0], per_example[0], epsilon = 1e-6);
}

#[test]
fn test_iteration_count_tracks_successful_updates() {
    let mut graph = chain_graph();
    assert_eq!(graph.iteration_count(), 0);
    let data = chain_data();
    let mut sgd = Sgd::new(0.1);
    for _ in 0..3 {
        graph.fit(&data, &mut sgd).unwrap();
    }
    assert_eq!(graph.iteration_count(), 3);
    assert_eq!(graph.descriptor().iteration_count, 3);

    // 推理、单纯求梯度与失败的训练都不计数
    graph.score(&data).unwrap();
    graph.compute_gradient_and_score(&data).unwrap();
    let bad = MultiDataSet::single(random_tensor(&[4, 4], 3), super::one_hot(&[0, 1, 2, 0], 3));
    assert!(graph.fit(&bad, &mut sgd).is_err());
    assert_eq!(graph.iteration_count(), 3);

    assert_eq!(graph.clone().iteration_count(), 3);
    // 由描述符重新构图时从0开始
    let rebuilt = GraphBuilder::from_descriptor(&graph.descriptor())
        .build()
        .unwrap();
    assert_eq!(rebuilt.iteration_count(), 0);
}
