//! Request validation errors

use thiserror::Error;

/// A malformed inbound request; terminal for the turn
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Request must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid request payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}
