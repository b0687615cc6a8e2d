//! Error types shared by the model, store and pilots.

use thiserror::Error;

use crate::model::{DeploymentId, JobState};

/// Errors raised by the store, the job state machine and pilots.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The backend rejected or failed the work.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were missing or rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The pilot does not implement this operation or job type.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A job state change the state machine forbids.
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    /// A record that had to exist did not.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A deployment cannot be deleted while jobs reference it.
    #[error("Deployment {0} is referenced by {1} job(s)")]
    DeploymentInUse(DeploymentId, usize),

    /// A measurement key matched neither binary nor hex notation.
    #[error("Unrecognized measurement key: {0:?}")]
    InvalidMeasurementKey(String),

    /// Conversion of a program failed inside a pilot.
    #[error(transparent)]
    Transpile(#[from] qpilot_transpile::TranspileError),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
