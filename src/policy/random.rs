//! Random policy for testing and baselines.

use rand::{Rng, RngCore};

use super::trait_::Policy;
use super::PolicyError;
use crate::env::Observation;
use crate::types::{GlimpseAction, Movement};

/// Uniformly random action selection.
///
/// Movements are drawn from the four directions; glimpse actions also draw
/// a label from `[0, num_labels)`. Used for sanity checks and as a
/// lower-bound baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomPolicy {
    num_labels: usize,
}

impl RandomPolicy {
    /// Creates a new random policy.
    ///
    /// # Arguments
    ///
    /// * `num_labels` - Number of classification labels; 0 or 1 always
    ///   guesses label 0.
    pub fn new(num_labels: usize) -> Self {
        Self { num_labels }
    }
}

impl Policy<usize> for RandomPolicy {
    fn select_action(
        &mut self,
        _observation: &Observation,
        rng: &mut dyn RngCore,
    ) -> Result<usize, PolicyError> {
        Ok(rng.gen_range(0..Movement::COUNT))
    }

    fn name(&self) -> &str {
        "random"
    }
}

impl Policy<GlimpseAction> for RandomPolicy {
    fn select_action(
        &mut self,
        observation: &Observation,
        rng: &mut dyn RngCore,
    ) -> Result<GlimpseAction, PolicyError> {
        let movement = <Self as Policy<usize>>::select_action(self, observation, rng)?;
        let label = rng.gen_range(0..self.num_labels.max(1));
        Ok(GlimpseAction::new(movement, label))
    }

    fn name(&self) -> &str {
        "random"
    }
}
