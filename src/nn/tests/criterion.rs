use crate::assert_err;
use crate::nn::{GraphError, LossFunction};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_mse_score_and_gradient() {
    let output = Tensor::new(&[1.0, 2.0], &[1, 2]);
    let labels = Tensor::zeros(&[1, 2]);
    // (1 + 4) / 2个输出 / 1个样本
    let score = LossFunction::Mse.score(&output, &labels, None, 1).unwrap();
    assert_abs_diff_eq!(score, 2.5, epsilon = 1e-6);
    let grad = LossFunction::Mse.gradient(&output, &labels, None, 1).unwrap();
    assert_eq!(grad, Tensor::new(&[1.0, 2.0], &[1, 2]));
}

#[test]
fn test_mcxent_score_and_gradient() {
    let output = Tensor::new(&[0.5, 0.5], &[1, 2]);
    let labels = Tensor::new(&[1.0, 0.0], &[1, 2]);
    let score = LossFunction::Mcxent.score(&output, &labels, None, 1).unwrap();
    assert_abs_diff_eq!(score, std::f32::consts::LN_2, epsilon = 1e-6);
    let grad = LossFunction::Mcxent
        .gradient(&output, &labels, None, 1)
        .unwrap();
    assert_eq!(grad, Tensor::new(&[-2.0, 0.0], &[1, 2]));

    // 概率为0时被截断，分数有限
    let zero = Tensor::new(&[0.0, 1.0], &[1, 2]);
    let score = LossFunction::Mcxent.score(&zero, &labels, None, 1).unwrap();
    assert!(score.is_finite());
}

#[test]
fn test_masked_rows_are_ignored() {
    let output = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
    let labels = Tensor::zeros(&[2, 2]);
    let mask = Tensor::new(&[1.0, 0.0], &[2, 1]);
    // 只有第一行计入，仍按2个样本取平均
    let score = LossFunction::Mse
        .score(&output, &labels, Some(&mask), 2)
        .unwrap();
    assert_abs_diff_eq!(score, 1.25, epsilon = 1e-6);
    let grad = LossFunction::Mse
        .gradient(&output, &labels, Some(&mask), 2)
        .unwrap();
    assert_eq!(grad, Tensor::new(&[0.5, 1.0, 0.0, 0.0], &[2, 2]));
}

#[test]
fn test_masked_time_steps_are_ignored() {
    // [batch=1, n_out=2, time=2]，第二个时间步被掩码
    let output = Tensor::ones(&[1, 2, 2]);
    let labels = Tensor::zeros(&[1, 2, 2]);
    let mask = Tensor::new(&[1.0, 0.0], &[1, 2]);
    let score = LossFunction::Mse
        .score(&output, &labels, Some(&mask), 1)
        .unwrap();
    assert_abs_diff_eq!(score, 1.0, epsilon = 1e-6);
    let grad = LossFunction::Mse
        .gradient(&output, &labels, Some(&mask), 1)
        .unwrap();
    assert_eq!(grad, Tensor::new(&[1.0, 0.0, 1.0, 0.0], &[1, 2, 2]));
}

#[test]
fn test_bad_labels_or_mask() {
    let output = Tensor::zeros(&[2, 2]);
    assert_err!(
        LossFunction::Mse.score(&output, &Tensor::zeros(&[2, 3]), None, 2),
        GraphError::ComputationError("标签形状[2, 3]与输出形状[2, 2]不一致")
    );
    assert_err!(
        LossFunction::Mcxent.gradient(&output, &output, Some(&Tensor::ones(&[3, 1])), 2),
        GraphError::ComputationError("掩码形状[3, 1]无法匹配输出形状[2, 2]")
    );
}
