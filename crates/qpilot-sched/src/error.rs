//! Error handling for dispatch and reconciliation.

use qpilot_core::{CoreError, DeploymentId, JobId, JobState};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while dispatching, cancelling or watching jobs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SchedError {
    /// No registered pilot serves the provider.
    #[error("No pilot registered for provider {0}")]
    NoPilot(String),

    /// A second pilot was registered for a provider.
    #[error("A pilot for provider {0} is already registered")]
    DuplicatePilot(String),

    /// Job not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Device not found in the store.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Deployment not found in the store.
    #[error("Deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// The job's state does not allow the requested operation.
    #[error("Cannot {action} job {job_id} in state {state}")]
    InvalidTransition {
        job_id: JobId,
        state: JobState,
        action: &'static str,
    },

    /// One or more programs could not be converted; the job is ERROR.
    #[error("{failed} program(s) of job {job_id} failed to transpile")]
    Transpilation { job_id: JobId, failed: usize },

    /// Store or pilot failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
