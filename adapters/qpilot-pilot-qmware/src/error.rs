//! Error types for the QMware pilot.

use qpilot_core::CoreError;
use thiserror::Error;

/// Result type for QMware operations.
pub type QmwareResult<T> = Result<T, QmwareError>;

/// Errors that can occur when talking to QMware.
#[derive(Debug, Error)]
pub enum QmwareError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No user token was supplied with the job.
    #[error("Missing QMware token: supply one with the job or set QPILOT_QMWARE_TOKEN")]
    MissingToken,

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request id is unknown to QMware.
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    /// Program was not in a text format QMware accepts.
    #[error("Program is not QASM text: {0}")]
    InvalidProgram(String),
}

impl From<QmwareError> for CoreError {
    fn from(e: QmwareError) -> Self {
        match e {
            QmwareError::MissingToken => CoreError::Authentication(e.to_string()),
            QmwareError::ApiError {
                status: 401 | 403, ..
            } => CoreError::Authentication(e.to_string()),
            QmwareError::Http(_) => CoreError::Network(e.to_string()),
            QmwareError::ApiError {
                status: 500..=599, ..
            } => CoreError::Network(e.to_string()),
            _ => CoreError::Backend(e.to_string()),
        }
    }
}
