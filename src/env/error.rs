use thiserror::Error;

use crate::config::ConfigError;
use crate::data::DataError;

/// Errors raised by the environments.
///
/// Invalid actions and calls out of lifecycle order are caller bugs and are
/// reported, never clamped or ignored.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error("Invalid {kind} index {index}: expected a value below {limit}")]
    InvalidAction {
        kind: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("Action row needs a movement and a label column, got {0} columns")]
    MalformedAction(usize),

    #[error("Action entry {0} is not a non-negative integer")]
    NonIntegralAction(f32),

    #[error("Environment must be reset before stepping")]
    NotReset,

    #[error("Episode is finished; call reset to start a new one")]
    EpisodeFinished,

    #[error("Environment is closed")]
    Closed,

    #[error("No sample with a label below {num_labels} after {attempts} draws")]
    ResampleExhausted { attempts: u32, num_labels: usize },

    #[error("No image with a reachable goal object after {attempts} draws")]
    NoGoalObject { attempts: u32 },

    #[error("Sample shape mismatch: expected {expected:?}, got {actual:?}")]
    ImageShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
