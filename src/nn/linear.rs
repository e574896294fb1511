use ndarray::{Array1, Array2};
use rand::Rng;

use super::{uniform_init, ShapeError};

/// Fully connected layer `y = x Wᵀ + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// `(out_features, in_features)`
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    /// Creates a layer with uniformly initialized weights and zero bias.
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        Self {
            weight: uniform_init((out_features, in_features), in_features, rng),
            bias: Array1::zeros(out_features),
        }
    }

    /// Creates a layer from explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Features`] if `bias` does not have one entry per
    /// row of `weight`.
    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self, ShapeError> {
        if weight.nrows() != bias.len() {
            return Err(ShapeError::Features {
                layer: "linear bias",
                expected: weight.nrows(),
                actual: bias.len(),
            });
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    /// Applies the layer to a `(batch, in_features)` matrix.
    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>, ShapeError> {
        if x.ncols() != self.in_features() {
            return Err(ShapeError::Features {
                layer: "linear",
                expected: self.in_features(),
                actual: x.ncols(),
            });
        }
        Ok(x.dot(&self.weight.t()) + &self.bias)
    }
}
