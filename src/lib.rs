// Tensor-train layer: a multilinear map over segments of the input, built
// from a chain of low-rank cores, plus the randomized smoke harness used to
// exercise it.

pub mod config;
pub mod error;
pub mod module;
pub mod contraction;
pub mod layer;
pub mod scenario;
pub mod cli;

pub use config::{HarnessConfig, LayerConfig};
pub use error::TensorError;
pub use layer::TensorTrainLayer;
pub use module::Module;
