use crate::assert_err;
use crate::nn::{GraphError, MaskPolicy, combine_masks};
use crate::tensor::Tensor;

#[test]
fn test_pass_through_takes_the_present_mask() {
    let mask = Tensor::new(&[1.0, 0.0], &[2, 1]);
    assert_eq!(
        combine_masks(&[Some(&mask)], MaskPolicy::PassThrough, 2).unwrap(),
        Some(mask.clone())
    );
    assert_eq!(
        combine_masks(&[None], MaskPolicy::PassThrough, 2).unwrap(),
        None
    );
    assert_eq!(combine_masks(&[], MaskPolicy::And, 2).unwrap(), None);
}

#[test]
fn test_and_multiplies_masks() {
    let a = Tensor::new(&[1.0, 1.0, 0.0, 1.0], &[2, 2]);
    let b = Tensor::new(&[1.0, 0.0, 1.0, 1.0], &[2, 2]);
    assert_eq!(
        combine_masks(&[Some(&a), Some(&b)], MaskPolicy::And, 2).unwrap(),
        Some(Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]))
    );
    // 缺省的掩码视为全1
    assert_eq!(
        combine_masks(&[None, Some(&b)], MaskPolicy::And, 2).unwrap(),
        Some(b.clone())
    );

    let c = Tensor::new(&[1.0, 1.0], &[2, 1]);
    assert_err!(
        combine_masks(&[Some(&a), Some(&c)], MaskPolicy::And, 2),
        GraphError::ComputationError("无法合并形状不同的掩码：[2, 2]与[2, 1]")
    );
}

#[test]
fn test_time_folding_policies() {
    let mask = Tensor::new(&[1.0, 1.0, 0.0, 1.0, 0.0, 0.0], &[2, 3]);
    let flat = combine_masks(&[Some(&mask)], MaskPolicy::FlattenTime, 2)
        .unwrap()
        .unwrap();
    assert_eq!(flat.shape(), &[6, 1]);
    assert_eq!(flat.to_vec(), mask.to_vec());

    let restored = combine_masks(&[Some(&flat)], MaskPolicy::UnflattenTime, 2)
        .unwrap()
        .unwrap();
    assert_eq!(restored, mask);

    assert_err!(
        combine_masks(&[Some(&flat)], MaskPolicy::UnflattenTime, 4),
        GraphError::ComputationError("掩码元素个数6无法按batch大小4还原时间维")
    );
    assert_err!(
        combine_masks(&[Some(&flat.reshape(&[6]).unwrap())], MaskPolicy::FlattenTime, 2),
        GraphError::ComputationError(msg) if msg.starts_with("时间折叠要求掩码形状为[batch, time]")
    );
    assert_eq!(
        combine_masks(&[None], MaskPolicy::UnflattenTime, 2).unwrap(),
        None
    );
}
