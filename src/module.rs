// src/module.rs

use std::error::Error;

// Trait for layers that perform a forward pass over owned parameters.
pub trait Module: std::fmt::Debug {
    type Input;
    type Output;

    fn forward(&self, input: Self::Input) -> Result<Self::Output, Box<dyn Error>>;

    // Number of trainable scalars held by the module
    fn num_parameters(&self) -> usize;
}
