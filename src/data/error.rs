use thiserror::Error;

/// Failure to produce the next sample.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("Data source contains no samples")]
    Empty,

    #[error("Normalization needs one statistic or one per plane ({planes}), got {given}")]
    Normalization { planes: usize, given: usize },
}
