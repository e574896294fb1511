//! Action distributions and the linear heads that parameterize them.
//!
//! Discrete actions travel as whole numbers in `f32` action matrices so that
//! a movement and a classification can share one row.

use std::f32::consts::PI;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::PolicyError;
use crate::config::ActionSpace;
use crate::nn::Linear;
use crate::types::index_from_f32;

/// Categorical distribution over `K` choices, one per batch row.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorical {
    /// Normalized log-probabilities `(N, K)`.
    log_probs: Array2<f32>,
}

impl Categorical {
    /// Builds the distribution from unnormalized logits.
    pub fn from_logits(mut logits: Array2<f32>) -> Self {
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
            row.mapv_inplace(|v| v - log_sum);
        }
        Self { log_probs: logits }
    }

    /// Number of choices.
    pub fn num_choices(&self) -> usize {
        self.log_probs.ncols()
    }

    /// Probabilities `(N, K)`.
    pub fn probs(&self) -> Array2<f32> {
        self.log_probs.mapv(f32::exp)
    }

    /// Draws one index per row.
    ///
    /// # Errors
    ///
    /// [`PolicyError::Weights`] if a row holds no finite positive mass
    /// (for instance NaN logits).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Array1<usize>, PolicyError> {
        self.log_probs
            .axis_iter(Axis(0))
            .map(|row| -> Result<usize, PolicyError> {
                let weights = WeightedIndex::new(row.iter().map(|lp| lp.exp()))?;
                Ok(weights.sample(rng))
            })
            .collect()
    }

    /// Most likely index per row.
    pub fn mode(&self) -> Array1<usize> {
        self.log_probs
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (k, &v)| {
                        if v > best.1 {
                            (k, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }

    /// Log-probability of `actions[i]` under row `i`.
    pub fn log_probs(&self, actions: ArrayView1<'_, usize>) -> Result<Array1<f32>, PolicyError> {
        if actions.len() != self.log_probs.nrows() {
            return Err(PolicyError::BatchShape {
                rows: actions.len(),
                states: self.log_probs.nrows(),
            });
        }
        actions
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                self.log_probs
                    .get((i, a))
                    .copied()
                    .ok_or(PolicyError::ActionOutOfRange {
                        index: a,
                        limit: self.num_choices(),
                    })
            })
            .collect()
    }

    /// Entropy per row.
    pub fn entropy(&self) -> Array1<f32> {
        self.log_probs
            .axis_iter(Axis(0))
            .map(|row| -row.iter().map(|&lp| lp.exp() * lp).sum::<f32>())
            .collect()
    }
}

/// Gaussian with diagonal covariance; the mean depends on the input, the
/// log standard deviation is a free per-dimension parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagGaussian {
    mean: Array2<f32>,
    log_std: Array1<f32>,
}

impl DiagGaussian {
    pub fn new(mean: Array2<f32>, log_std: Array1<f32>) -> Self {
        Self { mean, log_std }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f32> {
        let mut out = self.mean.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (v, &ls) in row.iter_mut().zip(self.log_std.iter()) {
                let eps: f32 = StandardNormal.sample(rng);
                *v += ls.exp() * eps;
            }
        }
        out
    }

    pub fn mode(&self) -> Array2<f32> {
        self.mean.clone()
    }

    /// Log-density of each row of `actions`, summed over dimensions.
    pub fn log_probs(&self, actions: ArrayView2<'_, f32>) -> Result<Array1<f32>, PolicyError> {
        if actions.dim() != self.mean.dim() {
            return Err(PolicyError::ActionColumns {
                expected: self.mean.ncols(),
                actual: actions.ncols(),
            });
        }
        let half_log_two_pi = 0.5 * (2.0 * PI).ln();
        Ok(actions
            .axis_iter(Axis(0))
            .zip(self.mean.axis_iter(Axis(0)))
            .map(|(a, m)| {
                a.iter()
                    .zip(m.iter())
                    .zip(self.log_std.iter())
                    .map(|((&a, &m), &ls)| {
                        let var = (2.0 * ls).exp();
                        -(a - m).powi(2) / (2.0 * var) - ls - half_log_two_pi
                    })
                    .sum()
            })
            .collect())
    }

    /// Entropy per row (identical for every row).
    pub fn entropy(&self) -> Array1<f32> {
        let per_dim = 0.5 + 0.5 * (2.0 * PI).ln();
        let total: f32 = self.log_std.iter().map(|&ls| per_dim + ls).sum();
        Array1::from_elem(self.mean.nrows(), total)
    }
}

/// Linear layer producing categorical logits.
#[derive(Debug, Clone)]
pub struct CategoricalHead {
    linear: Linear,
}

impl CategoricalHead {
    pub fn new<R: Rng>(feature_size: usize, choices: usize, rng: &mut R) -> Self {
        Self {
            linear: Linear::new(feature_size, choices, rng),
        }
    }

    pub fn forward(&self, features: &Array2<f32>) -> Result<Categorical, PolicyError> {
        Ok(Categorical::from_logits(self.linear.forward(features)?))
    }
}

/// Linear layer producing the mean of a [`DiagGaussian`].
#[derive(Debug, Clone)]
pub struct DiagGaussianHead {
    linear: Linear,
    log_std: Array1<f32>,
}

impl DiagGaussianHead {
    pub fn new<R: Rng>(feature_size: usize, dim: usize, rng: &mut R) -> Self {
        Self {
            linear: Linear::new(feature_size, dim, rng),
            log_std: Array1::zeros(dim),
        }
    }

    pub fn forward(&self, features: &Array2<f32>) -> Result<DiagGaussian, PolicyError> {
        Ok(DiagGaussian::new(
            self.linear.forward(features)?,
            self.log_std.clone(),
        ))
    }
}

/// Head for the movement action space.
#[derive(Debug, Clone)]
pub enum ActionHead {
    Categorical(CategoricalHead),
    Gaussian(DiagGaussianHead),
}

impl ActionHead {
    /// Builds the head matching `space`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::EmptyActionSpace`] for zero actions or dimensions.
    pub fn new<R: Rng>(feature_size: usize, space: ActionSpace, rng: &mut R) -> Result<Self, PolicyError> {
        match space {
            ActionSpace::Discrete(0) | ActionSpace::Continuous(0) => Err(PolicyError::EmptyActionSpace),
            ActionSpace::Discrete(n) => Ok(Self::Categorical(CategoricalHead::new(feature_size, n, rng))),
            ActionSpace::Continuous(d) => Ok(Self::Gaussian(DiagGaussianHead::new(feature_size, d, rng))),
        }
    }

    pub fn forward(&self, features: &Array2<f32>) -> Result<ActionDistribution, PolicyError> {
        match self {
            Self::Categorical(head) => head.forward(features).map(ActionDistribution::Categorical),
            Self::Gaussian(head) => head.forward(features).map(ActionDistribution::Gaussian),
        }
    }
}

/// A movement distribution, producing action matrices.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDistribution {
    Categorical(Categorical),
    Gaussian(DiagGaussian),
}

impl ActionDistribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Array2<f32>, PolicyError> {
        match self {
            Self::Categorical(d) => Ok(index_column(&d.sample(rng)?)),
            Self::Gaussian(d) => Ok(d.sample(rng)),
        }
    }

    pub fn mode(&self) -> Array2<f32> {
        match self {
            Self::Categorical(d) => index_column(&d.mode()),
            Self::Gaussian(d) => d.mode(),
        }
    }

    /// Log-probabilities of the rows of `actions`.
    pub fn log_probs(&self, actions: ArrayView2<'_, f32>) -> Result<Array1<f32>, PolicyError> {
        match self {
            Self::Categorical(d) => {
                if actions.ncols() != 1 {
                    return Err(PolicyError::ActionColumns {
                        expected: 1,
                        actual: actions.ncols(),
                    });
                }
                let indices = column_indices(actions.column(0))?;
                d.log_probs(indices.view())
            }
            Self::Gaussian(d) => d.log_probs(actions),
        }
    }

    pub fn entropy(&self) -> Array1<f32> {
        match self {
            Self::Categorical(d) => d.entropy(),
            Self::Gaussian(d) => d.entropy(),
        }
    }
}

/// Indices as an `(N, 1)` float column.
pub(crate) fn index_column(indices: &Array1<usize>) -> Array2<f32> {
    indices
        .mapv(|i| i as f32)
        .insert_axis(Axis(1))
}

/// Parses a float column of whole numbers back into indices.
pub(crate) fn column_indices(column: ArrayView1<'_, f32>) -> Result<Array1<usize>, PolicyError> {
    column
        .iter()
        .map(|&v| index_from_f32(v).map_err(PolicyError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn categorical_normalizes() {
        let d = Categorical::from_logits(array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]]);
        for row in d.probs().axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        let uniform = d.entropy()[1];
        assert!((uniform - 3.0_f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn categorical_mode_and_log_probs() {
        let d = Categorical::from_logits(array![[0.0, 5.0], [3.0, -1.0]]);
        assert_eq!(d.mode(), array![1, 0]);
        let lp = d.log_probs(array![1, 0].view()).unwrap();
        assert!(lp.iter().all(|&v| v < 0.0 && v > -0.1));
        assert!(matches!(
            d.log_probs(array![2, 0].view()),
            Err(PolicyError::ActionOutOfRange { index: 2, limit: 2 })
        ));
    }

    #[test]
    fn categorical_sampling_follows_probabilities() {
        let d = Categorical::from_logits(array![[0.0, 10.0, -10.0]]);
        let mut rng = StdRng::seed_from_u64(0);
        let hits = (0..200).filter(|_| d.sample(&mut rng).unwrap()[0] == 1).count();
        assert!(hits > 190);
    }

    #[test]
    fn categorical_never_samples_impossible_choices() {
        // exp(-200) underflows to zero in f32
        let d = Categorical::from_logits(array![[-200.0, 0.0, -200.0], [0.0, -200.0, -200.0]]);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            assert_eq!(d.sample(&mut rng).unwrap(), array![1, 0]);
        }
    }

    #[test]
    fn categorical_nan_logits_rejected() {
        let d = Categorical::from_logits(array![[f32::NAN, 0.0]]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(d.sample(&mut rng), Err(PolicyError::Weights(_))));
    }

    #[test]
    fn gaussian_log_prob_of_mean() {
        let d = DiagGaussian::new(array![[0.0, 1.0]], array![0.0, 0.0]);
        let lp = d.log_probs(array![[0.0, 1.0]].view()).unwrap();
        // two standard normal densities at their mean
        assert!((lp[0] + (2.0 * PI).ln()).abs() < 1e-5);
        let h = d.entropy()[0];
        assert!((h - (1.0 + (2.0 * PI).ln())).abs() < 1e-5);
    }

    #[test]
    fn gaussian_sample_and_mode() {
        let d = DiagGaussian::new(array![[3.0], [3.0]], array![-20.0]);
        let mut rng = StdRng::seed_from_u64(1);
        let s = d.sample(&mut rng);
        assert!(s.iter().all(|v| (v - 3.0).abs() < 1e-4));
        assert_eq!(d.mode(), array![[3.0], [3.0]]);
    }

    #[test]
    fn action_head_rejects_empty_space() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            ActionHead::new(8, ActionSpace::Discrete(0), &mut rng),
            Err(PolicyError::EmptyActionSpace)
        ));
    }

    #[test]
    fn discrete_actions_round_trip_through_floats() {
        let idx = array![0, 3, 2];
        let col = index_column(&idx);
        assert_eq!(col.dim(), (3, 1));
        assert_eq!(column_indices(col.column(0)).unwrap(), idx);
        assert!(column_indices(array![0.5_f32].view()).is_err());
    }
}
