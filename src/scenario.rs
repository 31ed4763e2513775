//! Randomized smoke scenarios for [`TensorTrainLayer`].
//!
//! Configurations come from an explicitly seeded RNG so a failing case can be
//! replayed from its seed.

use log::{error, info};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::config::{HarnessConfig, LayerConfig};
use crate::error::TensorError;
use crate::layer::TensorTrainLayer;

/// Lazy, finite stream of random layer configurations.
///
/// Each call to `next` draws fresh values; the stream cannot be rewound.
#[derive(Debug)]
pub struct CaseGenerator<R> {
    rng: R,
    remaining: usize,
    bounds: HarnessConfig,
}

impl<R: Rng> CaseGenerator<R> {
    pub fn new(rng: R, bounds: HarnessConfig) -> Self {
        let remaining = bounds.num_cases;
        Self { rng, remaining, bounds }
    }
}

impl<R: Rng> Iterator for CaseGenerator<R> {
    type Item = LayerConfig;

    fn next(&mut self) -> Option<LayerConfig> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let b = &self.bounds;
        let rank = self.rng.gen_range(b.min_rank..=b.max_rank);
        let num_factors = self.rng.gen_range(b.min_factors..=b.max_factors);

        let (lo, hi) = (b.min_mode, b.max_mode);
        let in_modes: Vec<usize> = (0..num_factors).map(|_| self.rng.gen_range(lo..=hi)).collect();
        let out_modes: Vec<usize> = (0..num_factors).map(|_| self.rng.gen_range(lo..=hi)).collect();
        let ranks = vec![rank; num_factors - 1];

        Some(LayerConfig::new(in_modes, out_modes, ranks))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Rng> ExactSizeIterator for CaseGenerator<R> {}

/// `num_cases` configurations with the default bounds: rank in [1, 4],
/// factor count in [2, 4], modes in [2, 5].
pub fn generate_random_test_cases<R: Rng>(rng: R, num_cases: usize) -> CaseGenerator<R> {
    CaseGenerator::new(rng, HarnessConfig { num_cases, ..HarnessConfig::default() })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub config: LayerConfig,
    pub batch_size: usize,
    /// Output shape on success, the error message otherwise.
    pub result: Result<Vec<usize>, String>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub outcomes: Vec<ScenarioOutcome>,
}

impl ScenarioReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

fn forward_random_batch<R: Rng>(
    config: &LayerConfig,
    batch_size: usize,
    rng: &mut R,
) -> Result<Vec<usize>, TensorError> {
    let layer = TensorTrainLayer::new(config.clone(), rng)?;
    let input = Array2::from_shape_simple_fn((batch_size, config.input_width()), || {
        rng.sample::<f32, _>(StandardNormal)
    });
    let output = layer.forward(input.view())?;
    Ok(output.shape().to_vec())
}

/// Builds a layer for `config`, runs one random batch of size in
/// `[1, max_batch_size]` through it and records the result.
///
/// Errors are logged with the configuration that caused them and turned into
/// a failed outcome; they are never propagated.
pub fn run_scenario<R: Rng>(config: &LayerConfig, max_batch_size: usize, rng: &mut R) -> ScenarioOutcome {
    let batch_size = rng.gen_range(1..=max_batch_size.max(1));

    let result = match forward_random_batch(config, batch_size, rng) {
        Ok(shape) => {
            info!(
                "Scenario passed for in_modes={:?}, out_modes={:?}, ranks={:?}: output shape {:?}",
                config.in_modes, config.out_modes, config.ranks, shape
            );
            Ok(shape)
        }
        Err(e) => {
            error!(
                "Scenario failed for in_modes={:?}, out_modes={:?}, ranks={:?} with error: {}",
                config.in_modes, config.out_modes, config.ranks, e
            );
            Err(e.to_string())
        }
    };

    ScenarioOutcome { config: config.clone(), batch_size, result }
}

/// Generates `harness.num_cases` configurations from `harness.seed` and runs
/// each of them.
pub fn run_scenarios(harness: &HarnessConfig) -> Result<ScenarioReport, TensorError> {
    harness.validate()?;

    let cases = CaseGenerator::new(StdRng::seed_from_u64(harness.seed), harness.clone());
    // Inputs and cores use their own stream so the case list depends only on the seed.
    let mut rng = StdRng::seed_from_u64(harness.seed.wrapping_add(1));

    let outcomes = cases
        .map(|config| run_scenario(&config, harness.max_batch_size, &mut rng))
        .collect();
    Ok(ScenarioReport { outcomes })
}
