//! Policy trait for the image environments.

use rand::RngCore;

use super::PolicyError;
use crate::env::Observation;

/// A policy that picks one action of type `A` per observation.
///
/// Randomness comes from the caller so that evaluation runs are
/// reproducible from a single seed.
pub trait Policy<A> {
    /// Selects the action to take after seeing `observation`.
    fn select_action(
        &mut self,
        observation: &Observation,
        rng: &mut dyn RngCore,
    ) -> Result<A, PolicyError>;

    /// Called before the first observation of every episode.
    fn begin_episode(&mut self) {}

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;
}
