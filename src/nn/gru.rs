use ndarray::{s, Array1, Array2};
use rand::Rng;

use super::{sigmoid, tanh, uniform_init, ShapeError};

/// Gated recurrent unit cell.
///
/// Gate order within the stacked weights is reset, update, candidate:
///
/// ```text
/// r  = σ(W_ir x + b_ir + W_hr h + b_hr)
/// z  = σ(W_iz x + b_iz + W_hz h + b_hz)
/// n  = tanh(W_in x + b_in + r ⊙ (W_hn h + b_hn))
/// h' = (1 − z) ⊙ n + z ⊙ h
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GruCell {
    w_ih: Array2<f32>,
    w_hh: Array2<f32>,
    b_ih: Array1<f32>,
    b_hh: Array1<f32>,
}

impl GruCell {
    /// Creates a cell with uniformly initialized weights and zero biases.
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        Self {
            w_ih: uniform_init((3 * hidden_size, input_size), hidden_size, rng),
            w_hh: uniform_init((3 * hidden_size, hidden_size), hidden_size, rng),
            b_ih: Array1::zeros(3 * hidden_size),
            b_hh: Array1::zeros(3 * hidden_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w_ih.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.w_hh.ncols()
    }

    /// One update: `x` is `(N, input)`, `h` is `(N, hidden)`.
    pub fn step(&self, x: &Array2<f32>, h: &Array2<f32>) -> Result<Array2<f32>, ShapeError> {
        let hidden = self.hidden_size();
        if x.ncols() != self.input_size() {
            return Err(ShapeError::Features {
                layer: "gru input",
                expected: self.input_size(),
                actual: x.ncols(),
            });
        }
        if h.ncols() != hidden {
            return Err(ShapeError::Features {
                layer: "gru state",
                expected: hidden,
                actual: h.ncols(),
            });
        }
        if x.nrows() != h.nrows() {
            return Err(ShapeError::Batch {
                layer: "gru",
                inputs: x.nrows(),
                states: h.nrows(),
            });
        }

        let gi = x.dot(&self.w_ih.t()) + &self.b_ih;
        let gh = h.dot(&self.w_hh.t()) + &self.b_hh;
        let r = sigmoid(&gi.slice(s![.., ..hidden]) + &gh.slice(s![.., ..hidden]));
        let z = sigmoid(&gi.slice(s![.., hidden..2 * hidden]) + &gh.slice(s![.., hidden..2 * hidden]));
        let n = tanh(&gi.slice(s![.., 2 * hidden..]) + &(&r * &gh.slice(s![.., 2 * hidden..])));
        Ok(&(1.0_f32 - &z) * &n + &z * h)
    }
}
