//! Partially observable image environments.
//!
//! Both environments follow the same lifecycle:
//!
//! 1. Construct once with a static configuration and a [`DataSource`](crate::data::DataSource).
//! 2. Call [`Environment::reset`] to draw a sample and start an episode.
//! 3. Call [`Environment::step`] until the returned [`StepResult`] is `done`.
//! 4. Call `reset` again for the next episode, or [`Environment::close`].
//!
//! A finished episode keeps its last observation readable; stepping it again
//! is an error until the next `reset`.

mod error;
pub mod localization;
pub mod observation;
pub mod reward;
pub mod window;

pub use error::EnvError;
pub use localization::LocalizationEnv;
pub use observation::{Observation, ObservationBuilder, UNSEEN};
pub use reward::RewardComputer;
pub use window::GlimpseEnv;

use rand::Rng;

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Observation after the step.
    pub observation: Observation,
    /// Reward earned by the step.
    pub reward: f64,
    /// Whether the episode ended with this step.
    pub done: bool,
    /// Steps taken in the episode so far, this one included.
    pub time_step: u32,
}

/// The contract shared by the environments.
pub trait Environment {
    /// What the agent submits each step.
    type Action;

    /// Shape `(channels, height, width)` of every observation.
    fn observation_shape(&self) -> [usize; 3];

    /// Starts a new episode, drawing its sample with `rng`.
    fn reset<R: Rng>(&mut self, rng: &mut R) -> Result<Observation, EnvError>;

    /// Applies one action.
    fn step(&mut self, action: Self::Action) -> Result<StepResult, EnvError>;

    /// The last observation, without side effects.
    fn current_obs(&self) -> Result<&Observation, EnvError>;

    /// Releases the environment; later `reset` and `step` calls fail.
    fn close(&mut self);
}
