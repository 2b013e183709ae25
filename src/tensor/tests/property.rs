use crate::errors::TensorError;
use crate::tensor::Tensor;

#[test]
fn test_new_and_properties() {
    let t = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    assert_eq!(t.shape(), &[2, 3]);
    assert_eq!(t.dimension(), 2);
    assert_eq!(t.size(), 6);
    assert!(!t.is_scalar());
    assert_eq!(t.number(), None);
    assert_eq!(t.to_vec(), vec![1., 2., 3., 4., 5., 6.]);
    assert_eq!(t.sum(), 21.);

    let s = Tensor::new(&[7.], &[1, 1]);
    assert!(s.is_scalar());
    assert_eq!(s.number(), Some(7.));
}

#[test]
fn test_try_new_with_wrong_length() {
    assert_eq!(
        Tensor::try_new(&[1., 2., 3.], &[2, 2]),
        Err(TensorError::DataLengthMismatch {
            shape: vec![2, 2],
            expected: 4,
            got: 3,
        })
    );
}

#[test]
#[should_panic]
fn test_new_with_wrong_length_panics() {
    let _ = Tensor::new(&[1., 2., 3.], &[2, 2]);
}

#[test]
fn test_uniform_is_reproducible_with_same_seed() {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    let mut rng_1 = StdRng::seed_from_u64(42);
    let mut rng_2 = StdRng::seed_from_u64(42);
    let a = Tensor::new_uniform(-1., 1., &[3, 4], &mut rng_1);
    let b = Tensor::new_uniform(-1., 1., &[3, 4], &mut rng_2);
    assert_eq!(a, b);
    assert!(a.to_vec().iter().all(|x| (-1.0..=1.0).contains(x)));
}

#[test]
fn test_display_shows_data_and_shape() {
    let t = Tensor::new(&[1.0, 2.5, -3.0, 4.0], &[2, 2]);
    let text = format!("{t}");
    assert!(text.contains("2.5000"), "{text}");
    assert!(text.ends_with("形状: [2, 2]"), "{text}");

    let text = format!("{t:.1}");
    assert!(text.contains("-3.0"), "{text}");
    assert!(!text.contains("-3.00"), "{text}");
}
