use ndarray::Array2;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use tensor_train_layer::scenario::{generate_random_test_cases, run_scenario};
use tensor_train_layer::{LayerConfig, Module, TensorError, TensorTrainLayer};

// Valid configuration: L modes in [1, 5], ranks of length L - 1.
fn valid_config() -> impl Strategy<Value = LayerConfig> {
    (1usize..=4).prop_flat_map(|n| {
        (
            prop::collection::vec(1usize..=5, n),
            prop::collection::vec(1usize..=5, n),
            prop::collection::vec(1usize..=4, n - 1),
        )
            .prop_map(|(in_modes, out_modes, ranks)| LayerConfig::new(in_modes, out_modes, ranks))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_valid_configs_construct(config in valid_config(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let layer = TensorTrainLayer::new(config.clone(), &mut rng);
        prop_assert!(layer.is_ok());
        prop_assert_eq!(layer.unwrap().num_cores(), config.ranks.len());
    }

    #[test]
    fn prop_forward_has_deterministic_shape(
        config in valid_config(),
        batch_size in 1usize..10,
        seed in any::<u64>()
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let layer = TensorTrainLayer::new(config.clone(), &mut rng).unwrap();
        let input = Array2::<f32>::ones((batch_size, config.input_width()));

        let expected = config.output_shape(batch_size);
        let output = layer.forward(input.view()).unwrap();
        prop_assert_eq!(output.shape(), &expected[..]);
        prop_assert!(output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn prop_mismatched_lengths_fail_validation(
        in_len in 1usize..5,
        out_len in 1usize..5,
        ranks_len in 0usize..5
    ) {
        prop_assume!(!(in_len == out_len && ranks_len + 1 == in_len));
        let config = LayerConfig::new(vec![2; in_len], vec![2; out_len], vec![1; ranks_len]);
        let result = TensorTrainLayer::new(config, &mut StdRng::seed_from_u64(0));
        prop_assert!(matches!(result, Err(TensorError::Validation(_))));
    }

    #[test]
    fn prop_wrong_width_is_shape_mismatch(config in valid_config(), extra in 1usize..4) {
        let layer = TensorTrainLayer::new(config.clone(), &mut StdRng::seed_from_u64(1)).unwrap();
        let input = Array2::<f32>::zeros((2, config.input_width() + extra));
        prop_assert!(matches!(layer.forward(input.view()), Err(TensorError::ShapeMismatch(_))));
    }
}

#[test]
fn test_concrete_two_mode_scenario() {
    let config = LayerConfig::new(vec![2, 3], vec![2, 2], vec![1]);
    let layer = TensorTrainLayer::new(config, &mut StdRng::seed_from_u64(42)).unwrap();
    assert_eq!(layer.num_cores(), 1);
    assert_eq!(layer.cores()[0].shape(), &[2, 2, 1, 1]);

    let output = Module::forward(&layer, Array2::<f32>::ones((4, 5))).unwrap();
    assert_eq!(output.shape(), &[4, 2, 3]);
}

#[test]
fn test_generated_cases_all_pass_forward() {
    let cases: Vec<LayerConfig> = generate_random_test_cases(StdRng::seed_from_u64(2024), 5).collect();
    assert_eq!(cases.len(), 5);

    let mut rng = StdRng::seed_from_u64(7);
    for config in &cases {
        assert!(config.validate().is_ok());
        let outcome = run_scenario(config, 9, &mut rng);
        assert!(
            outcome.passed(),
            "forward failed for {:?}: {:?}",
            outcome.config,
            outcome.result
        );
    }
}

#[test]
fn test_same_seed_same_output() {
    let config = LayerConfig::new(vec![3, 2, 4], vec![2, 3, 2], vec![2, 3]);
    let input = Array2::from_shape_fn((3, 9), |(b, k)| (b * 9 + k) as f32 * 0.1);

    let a = TensorTrainLayer::new(config.clone(), &mut StdRng::seed_from_u64(5)).unwrap();
    let b = TensorTrainLayer::new(config, &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(a.forward(input.view()).unwrap(), b.forward(input.view()).unwrap());
}
