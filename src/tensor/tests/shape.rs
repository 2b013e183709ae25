use crate::errors::TensorError;
use crate::tensor::Tensor;

#[test]
fn test_reshape_keeps_row_major_order() {
    let t = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let r = t.reshape(&[3, 2]).unwrap();
    assert_eq!(r, Tensor::new(&[1., 2., 3., 4., 5., 6.], &[3, 2]));

    assert_eq!(
        t.reshape(&[4, 2]),
        Err(TensorError::ReshapeMismatch {
            from: vec![2, 3],
            to: vec![4, 2],
        })
    );
}

#[test]
fn test_reshape_after_transpose_uses_logical_order() {
    let t = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let tt = t.transpose().unwrap();
    assert_eq!(tt, Tensor::new(&[1., 4., 2., 5., 3., 6.], &[3, 2]));
    assert_eq!(tt.reshape(&[6]).unwrap().to_vec(), vec![1., 4., 2., 5., 3., 6.]);
}

#[test]
fn test_permute() {
    // [b=1, n=2, t=3] -> [b, t, n]
    let t = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[1, 2, 3]);
    let p = t.permute(&[0, 2, 1]).unwrap();
    assert_eq!(p.shape(), &[1, 3, 2]);
    assert_eq!(p.to_vec(), vec![1., 4., 2., 5., 3., 6.]);

    assert_eq!(
        t.permute(&[0, 0, 1]),
        Err(TensorError::PermuteNeedUniqueAndInRange)
    );
    assert_eq!(t.permute(&[0, 1]), Err(TensorError::PermuteNeedUniqueAndInRange));
}

#[test]
fn test_concat_and_narrow() {
    let a = Tensor::new(&[1., 2., 3., 4.], &[2, 2]);
    let b = Tensor::new(&[5., 6.], &[2, 1]);
    let c = Tensor::concat(&[&a, &b], 1).unwrap();
    assert_eq!(c, Tensor::new(&[1., 2., 5., 3., 4., 6.], &[2, 3]));

    assert_eq!(c.narrow(1, 0, 2).unwrap(), a);
    assert_eq!(c.narrow(1, 2, 1).unwrap(), b);
    assert_eq!(c.narrow(1, 2, 2), Err(TensorError::IncompatibleShape));

    let wrong = Tensor::zeros(&[3, 1]);
    assert!(Tensor::concat(&[&a, &wrong], 1).is_err());
    assert_eq!(Tensor::concat(&[], 0), Err(TensorError::EmptyList));
}
