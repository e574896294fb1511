//! Memory between feature extraction and the policy heads.
//!
//! [`Stateless`] passes features through. [`Recurrent`] runs a GRU over
//! them, resetting each environment's hidden state where its episode mask
//! is 0.

use std::fmt;

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;

use super::features::BackboneKind;
use super::PolicyError;
use crate::nn::GruCell;

/// Per-environment memory carried between policy calls.
pub trait Memory: Sized {
    /// Hidden state of a batch.
    type State: Clone + fmt::Debug + PartialEq;

    /// Builds the memory for features of width `feature_size`.
    fn build<R: Rng>(
        feature_size: usize,
        backbone: &BackboneKind,
        rng: &mut R,
    ) -> Result<Self, PolicyError>;

    /// Width of one environment's hidden state; 0 without memory.
    fn state_size(&self) -> usize;

    /// Zero state for `batch` environments.
    fn initial_state(&self, batch: usize) -> Self::State;

    /// Feeds `features` through the memory.
    ///
    /// `masks` holds one entry per feature row: 0 where that row starts a
    /// new episode, 1 otherwise.
    fn update(
        &self,
        features: Array2<f32>,
        state: &Self::State,
        masks: &Array1<f32>,
    ) -> Result<(Array2<f32>, Self::State), PolicyError>;
}

/// No memory: features pass through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stateless;

impl Memory for Stateless {
    type State = ();

    fn build<R: Rng>(_: usize, _: &BackboneKind, _: &mut R) -> Result<Self, PolicyError> {
        Ok(Self)
    }

    fn state_size(&self) -> usize {
        0
    }

    fn initial_state(&self, _batch: usize) {}

    fn update(
        &self,
        features: Array2<f32>,
        _state: &(),
        _masks: &Array1<f32>,
    ) -> Result<(Array2<f32>, ()), PolicyError> {
        Ok((features, ()))
    }
}

/// GRU memory with a hidden state as wide as the features.
#[derive(Debug, Clone)]
pub struct Recurrent {
    cell: GruCell,
}

impl Recurrent {
    pub fn new(cell: GruCell) -> Self {
        Self { cell }
    }

    /// Sequence unrolling: `features` holds `T` consecutive steps of `N`
    /// environments, step-major (`rows = T * N`).
    fn unroll(
        &self,
        features: &Array2<f32>,
        state: &Array2<f32>,
        masks: &Array1<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>), PolicyError> {
        let n = state.nrows();
        let rows = features.nrows();
        if n == 0 || rows % n != 0 {
            return Err(PolicyError::BatchShape { rows, states: n });
        }
        let steps = rows / n;

        let mut outputs = Array2::zeros((rows, self.cell.hidden_size()));
        let mut hidden = state.clone();
        for t in 0..steps {
            let block = t * n..(t + 1) * n;
            let x = features.slice(s![block.clone(), ..]).to_owned();
            let reset = mask_rows(&hidden, masks.slice(s![block.clone()]));
            hidden = self.cell.step(&x, &reset)?;
            outputs.slice_mut(s![block, ..]).assign(&hidden);
        }
        Ok((outputs, hidden))
    }
}

impl Memory for Recurrent {
    type State = Array2<f32>;

    /// # Errors
    ///
    /// [`PolicyError::RecurrentMlp`] for flat observations.
    fn build<R: Rng>(
        feature_size: usize,
        backbone: &BackboneKind,
        rng: &mut R,
    ) -> Result<Self, PolicyError> {
        if backbone.is_mlp() {
            return Err(PolicyError::RecurrentMlp);
        }
        Ok(Self::new(GruCell::new(feature_size, feature_size, rng)))
    }

    fn state_size(&self) -> usize {
        self.cell.hidden_size()
    }

    fn initial_state(&self, batch: usize) -> Array2<f32> {
        Array2::zeros((batch, self.cell.hidden_size()))
    }

    fn update(
        &self,
        features: Array2<f32>,
        state: &Array2<f32>,
        masks: &Array1<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>), PolicyError> {
        if masks.len() != features.nrows() {
            return Err(PolicyError::MaskLength {
                expected: features.nrows(),
                actual: masks.len(),
            });
        }
        if features.nrows() == state.nrows() {
            let reset = mask_rows(state, masks.view());
            let hidden = self.cell.step(&features, &reset)?;
            return Ok((hidden.clone(), hidden));
        }
        self.unroll(&features, state, masks)
    }
}

/// Scales row `i` of `state` by `masks[i]`.
fn mask_rows(state: &Array2<f32>, masks: ArrayView1<'_, f32>) -> Array2<f32> {
    let mut out = state.clone();
    for (mut row, &m) in out.outer_iter_mut().zip(masks.iter()) {
        row *= m;
    }
    out
}
