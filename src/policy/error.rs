use rand::distributions::WeightedError;
use thiserror::Error;

use crate::config::{ConfigError, Dataset};
use crate::env::EnvError;
use crate::nn::ShapeError;

/// Errors raised while building or evaluating a policy.
///
/// Configuration problems surface from the constructors; shape problems
/// from the forward passes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Unsupported observation shape {0:?}: expected [C, H, W] or [D]")]
    UnsupportedObservationShape(Vec<usize>),

    #[error("Recurrent memory is not available for flat (MLP) observations")]
    RecurrentMlp,

    #[error("Action space must have at least one action or dimension")]
    EmptyActionSpace,

    #[error("{dataset} backbone cannot process {height}x{width} inputs")]
    InputTooSmall {
        dataset: Dataset,
        height: usize,
        width: usize,
    },

    #[error("Batch of {rows} rows cannot be split over {states} recurrent states")]
    BatchShape { rows: usize, states: usize },

    #[error("Expected {expected} episode masks, got {actual}")]
    MaskLength { expected: usize, actual: usize },

    #[error("Expected {expected} action columns, got {actual}")]
    ActionColumns { expected: usize, actual: usize },

    #[error("Action index {index} out of range for {limit} choices")]
    ActionOutOfRange { index: usize, limit: usize },

    #[error("Cannot sample from categorical weights: {0}")]
    Weights(#[from] WeightedError),

    #[error("Policy backend failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_shape_display() {
        let e = PolicyError::UnsupportedObservationShape(vec![1, 2]);
        assert_eq!(
            e.to_string(),
            "Unsupported observation shape [1, 2]: expected [C, H, W] or [D]"
        );
    }

    #[test]
    fn input_too_small_display() {
        let e = PolicyError::InputTooSmall {
            dataset: Dataset::Cityscapes,
            height: 16,
            width: 16,
        };
        assert_eq!(e.to_string(), "cityscapes backbone cannot process 16x16 inputs");
    }
}
