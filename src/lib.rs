//! saccade - glimpse-based image exploration for reinforcement learning
//!
//! Two partially observable environments built on a square window moving
//! over an image, and an actor-critic policy head that can drive them:
//!
//! - [`env::GlimpseEnv`]: classify an image the agent only sees through the
//!   window.
//! - [`env::LocalizationEnv`]: move the window onto a goal object.
//! - [`policy::PolicyHead`]: feature extractor, optional GRU memory, action
//!   distribution, value estimate and auxiliary classification head.

pub mod config;
pub mod data;
pub mod env;
pub mod metrics;
pub mod nn;
pub mod policy;
pub mod types;

pub use config::{ActionSpace, Dataset, GlimpseConfig, LocalizationConfig, PolicyConfig};
pub use env::{Environment, EnvError, Observation, StepResult};
pub use metrics::EvaluationMetrics;
pub use policy::{Policy, PolicyError, PolicyHead};
pub use types::{GlimpseAction, Movement, Position};
