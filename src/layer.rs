use log::debug;
use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayViewMut4, Axis, Ix3};
use rand::Rng;
use rand_distr::StandardNormal;
use std::error::Error;

use crate::config::{LayerConfig, MAX_ELEMENTS};
use crate::contraction::contract;
use crate::error::TensorError;
use crate::module::Module;

/// Multilinear layer built from a chain of low-rank cores.
///
/// Every input segment enters the output as a separate factor, so the map is
/// linear in each segment but not in the whole input: scaling the input by
/// `c` scales the output by `c^L` for `L` modes.
///
/// Core `i` is indexed `(in, out, left rank, right rank)`. The input's feature
/// axis is split into one segment per mode; segments with a core are
/// contracted through the rank chain, and the trailing segment (the last mode,
/// which has no core) is attached to the result as an outer factor:
///
/// ```text
/// h_0[b, 0, r]   = 1
/// y_i[b, o, r, s] = sum_k x_i[b, k] * G_i[k, o, r, s]
/// h_{i+1}[b, (p, o), s] = sum_r h_i[b, p, r] * y_i[b, o, r, s]
/// out[b, p, t]   = h_L[b, p, 0] * x_last[b, t]
/// ```
///
/// The last mode has no core, so `out_modes[L-1]` is validated but never
/// affects the output.
#[derive(Debug, Clone)]
pub struct TensorTrainLayer {
    config: LayerConfig,
    cores: Vec<Array4<f32>>,
}

impl TensorTrainLayer {
    /// Builds a layer with standard-normal cores drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(config: LayerConfig, rng: &mut R) -> Result<Self, TensorError> {
        config.validate()?;

        let mut cores = Vec::with_capacity(config.ranks.len());
        for i in 0..config.ranks.len() {
            let shape = config.core_shape(i).ok_or_else(|| {
                TensorError::OutOfBounds(format!("no core at position {}", i))
            })?;
            let core = Array4::from_shape_simple_fn(
                (shape[0], shape[1], shape[2], shape[3]),
                || rng.sample::<f32, _>(StandardNormal),
            );
            cores.push(core);
        }

        debug!(
            "Initialized tensor-train layer: in_modes={:?}, out_modes={:?}, ranks={:?}, {} cores",
            config.in_modes,
            config.out_modes,
            config.ranks,
            cores.len()
        );
        Ok(Self { config, cores })
    }

    /// Builds a layer from explicit core values.
    pub fn from_cores(config: LayerConfig, cores: Vec<Array4<f32>>) -> Result<Self, TensorError> {
        config.validate()?;
        if cores.len() != config.ranks.len() {
            return Err(TensorError::Validation(format!(
                "expected {} cores, got {}",
                config.ranks.len(),
                cores.len()
            )));
        }
        for (i, core) in cores.iter().enumerate() {
            check_core_shape(&config, i, core.shape())?;
        }
        Ok(Self { config, cores })
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn cores(&self) -> &[Array4<f32>] {
        &self.cores
    }

    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    /// Mutable view of core `i`; values can change, the shape cannot.
    pub fn core_mut(&mut self, i: usize) -> Option<ArrayViewMut4<'_, f32>> {
        self.cores.get_mut(i).map(|c| c.view_mut())
    }

    /// Replaces core `i`, which must keep its configured shape.
    pub fn set_core(&mut self, i: usize, core: Array4<f32>) -> Result<(), TensorError> {
        if i >= self.cores.len() {
            return Err(TensorError::OutOfBounds(format!(
                "core index {} out of range for {} cores",
                i,
                self.cores.len()
            )));
        }
        check_core_shape(&self.config, i, core.shape())?;
        self.cores[i] = core;
        Ok(())
    }

    pub fn output_shape(&self, batch_size: usize) -> [usize; 3] {
        self.config.output_shape(batch_size)
    }

    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Result<Array3<f32>, TensorError> {
        let (batch_size, width) = input.dim();
        if width != self.config.input_width() {
            return Err(TensorError::ShapeMismatch(format!(
                "input has {} features but in_modes {:?} sum to {}",
                width,
                self.config.in_modes,
                self.config.input_width()
            )));
        }
        let batch_elements = self
            .config
            .row_elements()
            .and_then(|row| row.checked_mul(batch_size));
        if batch_elements.map_or(true, |n| n > MAX_ELEMENTS) {
            return Err(TensorError::InvalidDimension(format!(
                "batch of {} samples exceeds {} elements in the forward pass",
                batch_size, MAX_ELEMENTS
            )));
        }

        let left_rank = self.config.ranks.first().copied().unwrap_or(1);
        let mut state = Array3::<f32>::ones((batch_size, 1, left_rank)).into_dyn();
        let mut offset = 0;

        for (i, core) in self.cores.iter().enumerate() {
            let in_mode = self.config.in_modes[i];
            let segment = input.slice(s![.., offset..offset + in_mode]);
            offset += in_mode;

            let projected = contract("bi,iors->bors", segment.into_dyn(), core.view().into_dyn())?;
            let chained = contract("bpr,bors->bpos", state.view(), projected.view())?;

            let (p, o, r_next) = (chained.shape()[1], chained.shape()[2], chained.shape()[3]);
            state = chained.into_shape((batch_size, p * o, r_next))?.into_dyn();
            debug!("core {}: running state {:?}", i, state.shape());
        }

        // The closing boundary rank is 1.
        let chain = state
            .into_dimensionality::<Ix3>()?
            .index_axis_move(Axis(2), 0);

        let trailing = input.slice(s![.., offset..]);
        let output = contract("bp,bt->bpt", chain.view().into_dyn(), trailing.into_dyn())?;
        Ok(output.into_dimensionality::<Ix3>()?)
    }
}

impl Module for TensorTrainLayer {
    type Input = Array2<f32>;
    type Output = Array3<f32>;

    fn forward(&self, input: Self::Input) -> Result<Self::Output, Box<dyn Error>> {
        Ok(TensorTrainLayer::forward(self, input.view())?)
    }

    fn num_parameters(&self) -> usize {
        self.cores.iter().map(|c| c.len()).sum()
    }
}

fn check_core_shape(config: &LayerConfig, i: usize, actual: &[usize]) -> Result<(), TensorError> {
    let expected = config
        .core_shape(i)
        .ok_or_else(|| TensorError::OutOfBounds(format!("no core at position {}", i)))?;
    if actual != &expected[..] {
        return Err(TensorError::ShapeMismatch(format!(
            "core {} has shape {:?}, expected {:?}",
            i, actual, expected
        )));
    }
    Ok(())
}
