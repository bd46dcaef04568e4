//! Typed errors for the optimizer core and the LUT store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("table has no outcomes")]
    EmptyTable,

    #[error("no winning outcomes in table")]
    NoWinners,

    #[error("invalid buckets: {0}")]
    InvalidBuckets(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("mode not found: {0}")]
    ModeNotFound(String),

    #[error("invalid weight CSV at line {line}: {reason}")]
    InvalidCsv { line: usize, reason: String },

    #[error("failed to save weights: {0}")]
    SaveFailed(#[from] std::io::Error),

    #[error("optimization cancelled")]
    Cancelled,
}
