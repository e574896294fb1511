//! Forward-only neural network building blocks on `ndarray`.
//!
//! These layers are the CPU stand-ins for an autograd engine: they evaluate
//! a network but do not train it. Weights are drawn from the generator
//! passed to each constructor so that a seeded policy is reproducible.
//! Batches are row-major matrices, one sample per row.

pub mod conv;
pub mod gru;
pub mod linear;

pub use conv::Conv2d;
pub use gru::GruCell;
pub use linear::Linear;

use ndarray::{Array, Dimension, ShapeBuilder};
use rand::Rng;
use thiserror::Error;

/// Input whose shape does not fit a layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{layer}: expected {expected} input features, got {actual}")]
    Features {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{layer}: input {height}x{width} is smaller than the {kernel}x{kernel} kernel")]
    TooSmall {
        layer: &'static str,
        height: usize,
        width: usize,
        kernel: usize,
    },

    #[error("{layer}: batch of {inputs} rows does not match state of {states} rows")]
    Batch {
        layer: &'static str,
        inputs: usize,
        states: usize,
    },
}

/// Uniform initialization in `[-bound, bound]` with `bound = 1 / sqrt(fan_in)`.
pub(crate) fn uniform_init<Sh, D, R>(shape: Sh, fan_in: usize, rng: &mut R) -> Array<f32, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng,
{
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    Array::from_shape_simple_fn(shape, || rng.gen_range(-bound..=bound))
}

/// Element-wise rectified linear unit.
pub fn relu<D: Dimension>(mut x: Array<f32, D>) -> Array<f32, D> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

/// Element-wise hyperbolic tangent.
pub fn tanh<D: Dimension>(mut x: Array<f32, D>) -> Array<f32, D> {
    x.mapv_inplace(f32::tanh);
    x
}

/// Element-wise logistic sigmoid.
pub fn sigmoid<D: Dimension>(mut x: Array<f32, D>) -> Array<f32, D> {
    x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn activations() {
        let x = array![-1.0_f32, 0.0, 2.0];
        assert_eq!(relu(x.clone()), array![0.0, 0.0, 2.0]);
        assert!((sigmoid(x.clone())[1] - 0.5).abs() < 1e-6);
        assert!((tanh(x)[2] - 2.0_f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn uniform_init_respects_bound() {
        let mut rng = StdRng::seed_from_u64(0);
        let w = uniform_init((8, 16), 16, &mut rng);
        assert!(w.iter().all(|&v| v.abs() <= 0.25));
    }
}
