//! Policies for the image environments.
//!
//! - [`RandomPolicy`]: uniform baseline.
//! - [`PolicyHead`]: actor-critic network with optional GRU memory and a
//!   classification head, driven through [`NeuralAgent`].

pub mod agent;
pub mod distribution;
mod error;
pub mod features;
pub mod head;
pub mod memory;
pub mod random;
#[cfg(feature = "rl-nn")]
pub mod tch_backbone;
pub mod trait_;

pub use agent::NeuralAgent;
pub use distribution::{ActionDistribution, Categorical, DiagGaussian};
pub use error::PolicyError;
pub use features::{BackboneKind, ConvArchitecture, ConvBase, FeatureExtractor, MlpTower};
pub use head::{ActOutput, ActionEvaluation, PolicyHead};
pub use memory::{Memory, Recurrent, Stateless};
pub use random::RandomPolicy;
#[cfg(feature = "rl-nn")]
pub use tch_backbone::TchConvBase;
pub use trait_::Policy;
