use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::TensorError;

/// Largest element count an `f32` array can hold without its byte size
/// overflowing `isize`.
pub const MAX_ELEMENTS: usize = isize::MAX as usize / std::mem::size_of::<f32>();

/// Shape description of a tensor-train layer.
///
/// `in_modes` and `out_modes` have one entry per factor; `ranks` links
/// adjacent factors and is therefore one entry shorter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    pub in_modes: Vec<usize>,
    pub out_modes: Vec<usize>,
    pub ranks: Vec<usize>,
}

impl LayerConfig {
    pub fn new(in_modes: Vec<usize>, out_modes: Vec<usize>, ranks: Vec<usize>) -> Self {
        Self { in_modes, out_modes, ranks }
    }

    pub fn load(config_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        if !Path::new(config_path).exists() {
            return Err(format!("Config file not found at: {}", config_path).into());
        }

        let mut file = File::open(config_path)
            .map_err(|e| format!("Failed to open config file {}: {}", config_path, e))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| format!("Failed to read config file {}: {}", config_path, e))?;

        let config: LayerConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to deserialize JSON from {}: {}", config_path, e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TensorError> {
        if self.in_modes.is_empty() {
            return Err(TensorError::Validation("at least one mode is required".to_string()));
        }
        if self.in_modes.len() != self.out_modes.len() {
            return Err(TensorError::Validation(format!(
                "in_modes has {} entries but out_modes has {}",
                self.in_modes.len(),
                self.out_modes.len()
            )));
        }
        if self.ranks.len() + 1 != self.in_modes.len() {
            return Err(TensorError::Validation(format!(
                "ranks must have exactly {} entries for {} modes, got {}",
                self.in_modes.len() - 1,
                self.in_modes.len(),
                self.ranks.len()
            )));
        }
        for (name, values) in [
            ("in_modes", &self.in_modes),
            ("out_modes", &self.out_modes),
            ("ranks", &self.ranks),
        ] {
            if let Some(pos) = values.iter().position(|&v| v == 0) {
                return Err(TensorError::Validation(format!(
                    "{}[{}] must be positive",
                    name, pos
                )));
            }
        }

        let width = self.in_modes.iter().try_fold(0usize, |acc, &m| acc.checked_add(m));
        if width.map_or(true, |w| w > MAX_ELEMENTS) {
            return Err(TensorError::Validation(format!(
                "sum of in_modes exceeds {} elements",
                MAX_ELEMENTS
            )));
        }
        for i in 0..self.ranks.len() {
            let elements = self
                .core_shape(i)
                .and_then(|shape| shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)));
            if elements.map_or(true, |n| n > MAX_ELEMENTS) {
                return Err(TensorError::Validation(format!(
                    "core {} exceeds {} elements",
                    i, MAX_ELEMENTS
                )));
            }
        }
        if self.row_elements().map_or(true, |n| n > MAX_ELEMENTS) {
            return Err(TensorError::Validation(format!(
                "per-sample output or intermediate state exceeds {} elements",
                MAX_ELEMENTS
            )));
        }
        Ok(())
    }

    /// Largest per-sample element count among the forward pass's intermediate
    /// tensors and its output, or `None` on overflow.
    pub fn row_elements(&self) -> Option<usize> {
        let r = self.boundary_ranks();
        let mut prefix = 1usize;
        let mut widest = r[0];
        for i in 0..self.ranks.len() {
            let projected = self.out_modes.get(i)?.checked_mul(r[i])?.checked_mul(r[i + 1])?;
            prefix = prefix.checked_mul(*self.out_modes.get(i)?)?;
            let state = prefix.checked_mul(r[i + 1])?;
            widest = widest.max(projected).max(state);
        }
        let output = prefix.checked_mul(*self.in_modes.last()?)?;
        Some(widest.max(output))
    }

    pub fn num_factors(&self) -> usize {
        self.in_modes.len()
    }

    /// Width of the flat feature axis the layer expects.
    pub fn input_width(&self) -> usize {
        self.in_modes.iter().fold(0usize, |acc, &m| acc.saturating_add(m))
    }

    /// `ranks` closed on the right with a boundary rank of 1.
    pub fn boundary_ranks(&self) -> Vec<usize> {
        let mut r = self.ranks.clone();
        r.push(1);
        r
    }

    /// Shape of core `i`: (in mode, out mode, left rank, right rank).
    pub fn core_shape(&self, i: usize) -> Option<[usize; 4]> {
        if i >= self.ranks.len() {
            return None;
        }
        let r = self.boundary_ranks();
        Some([self.in_modes[i], self.out_modes[i], r[i], r[i + 1]])
    }

    /// [batch, product of the cored out modes, width of the trailing segment]
    pub fn output_shape(&self, batch_size: usize) -> [usize; 3] {
        let contracted = self
            .out_modes
            .iter()
            .take(self.ranks.len())
            .fold(1usize, |acc, &m| acc.saturating_mul(m));
        let trailing = self.in_modes.last().copied().unwrap_or(0);
        [batch_size, contracted, trailing]
    }
}

/// Bounds for the randomized scenario generator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub num_cases: usize,
    pub seed: u64,
    pub min_rank: usize,
    pub max_rank: usize,
    pub min_factors: usize,
    pub max_factors: usize,
    pub min_mode: usize,
    pub max_mode: usize,
    pub max_batch_size: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            num_cases: 5,
            seed: 42,
            min_rank: 1,
            max_rank: 4,
            min_factors: 2,
            max_factors: 4,
            min_mode: 2,
            max_mode: 5,
            max_batch_size: 9,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), TensorError> {
        let bounds = [
            ("rank", self.min_rank, self.max_rank),
            ("factors", self.min_factors, self.max_factors),
            ("mode", self.min_mode, self.max_mode),
        ];
        for (name, lo, hi) in bounds {
            if lo == 0 || lo > hi {
                return Err(TensorError::Validation(format!(
                    "{} range [{}, {}] must be non-empty and positive",
                    name, lo, hi
                )));
            }
        }
        if self.max_batch_size == 0 {
            return Err(TensorError::Validation("max_batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_accepts_matching_lengths() {
        let config = LayerConfig::new(vec![2, 3], vec![2, 2], vec![1]);
        assert!(config.validate().is_ok());
        assert_eq!(config.num_factors(), 2);
        assert_eq!(config.input_width(), 5);
        assert_eq!(config.boundary_ranks(), vec![1, 1]);
    }

    #[test]
    fn test_validate_rejects_length_mismatch() {
        let out_short = LayerConfig::new(vec![2, 3], vec![2], vec![1]);
        assert!(matches!(out_short.validate(), Err(TensorError::Validation(_))));

        let ranks_long = LayerConfig::new(vec![2, 3], vec![2, 2], vec![1, 1]);
        let err = ranks_long.validate().unwrap_err();
        assert_eq!(
            err,
            TensorError::Validation("ranks must have exactly 1 entries for 2 modes, got 2".to_string())
        );

        let empty = LayerConfig::new(vec![], vec![], vec![]);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_entries() {
        let config = LayerConfig::new(vec![2, 0], vec![2, 2], vec![1]);
        let err = config.validate().unwrap_err();
        assert_eq!(err, TensorError::Validation("in_modes[1] must be positive".to_string()));
    }

    #[test]
    fn test_validate_rejects_oversized_modes() {
        let wide = LayerConfig::new(vec![usize::MAX / 2, 2], vec![4, 2], vec![1]);
        let err = wide.validate().unwrap_err();
        assert!(matches!(err, TensorError::Validation(_)));
        assert!(err.to_string().contains("sum of in_modes"), "{}", err);

        let big_core = LayerConfig::new(vec![1 << 30, 1], vec![1 << 30, 1], vec![1 << 10]);
        let err = big_core.validate().unwrap_err();
        assert!(err.to_string().contains("core 0"), "{}", err);

        let big_output = LayerConfig::new(
            vec![1, 1, 1, 1 << 20],
            vec![1 << 16, 1 << 16, 1 << 16, 1],
            vec![1, 1, 1],
        );
        let err = big_output.validate().unwrap_err();
        assert!(err.to_string().contains("per-sample"), "{}", err);
    }

    #[test]
    fn test_row_elements() {
        let config = LayerConfig::new(vec![2, 3, 4], vec![5, 6, 7], vec![2, 3]);
        // projected core 0: 5 * 2 * 3 = 30, output row: (5 * 6) * 4 = 120
        assert_eq!(config.row_elements(), Some(120));
    }

    #[test]
    fn test_core_and_output_shapes() {
        let config = LayerConfig::new(vec![2, 3, 4], vec![5, 6, 7], vec![2, 3]);
        assert_eq!(config.core_shape(0), Some([2, 5, 2, 3]));
        assert_eq!(config.core_shape(1), Some([3, 6, 3, 1]));
        assert_eq!(config.core_shape(2), None);
        assert_eq!(config.output_shape(8), [8, 30, 4]);
    }

    #[test]
    fn test_load_from_json() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"in_modes": [2, 3], "out_modes": [2, 2], "ranks": [1]}}"#)?;
        let path = file.path().to_str().ok_or("non-utf8 temp path")?;

        let config = LayerConfig::load(path)?;
        assert_eq!(config, LayerConfig::new(vec![2, 3], vec![2, 2], vec![1]));
        Ok(())
    }

    #[test]
    fn test_load_rejects_invalid_config() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"in_modes": [2, 3], "out_modes": [2, 2], "ranks": []}}"#)?;
        let path = file.path().to_str().ok_or("non-utf8 temp path")?;

        assert!(LayerConfig::load(path).is_err());
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = LayerConfig::load("does/not/exist.json");
        assert!(result.unwrap_err().to_string().contains("Config file not found"));
    }

    #[test]
    fn test_harness_defaults_are_valid() {
        let harness = HarnessConfig::default();
        assert!(harness.validate().is_ok());
        assert_eq!(harness.num_cases, 5);

        let bad = HarnessConfig { min_mode: 6, ..HarnessConfig::default() };
        assert!(bad.validate().is_err());
    }
}
