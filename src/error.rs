//! Error types for quiver

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed tensors, non-positive `k`, or a filter literal whose type
    /// cannot be compared against the target column.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required collaborator is missing or the coordinator was used after
    /// shutdown.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A collaborator failed: parent index, partition fetch, or predicate
    /// evaluator.
    #[error("Backend failure: {0}")]
    Backend(String),

    /// The worker pool is draining and refused new jobs.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Error::Cancelled(msg.into())
    }
}
