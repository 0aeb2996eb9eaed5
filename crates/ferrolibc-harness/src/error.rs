//! Harness error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid fixture json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no fixture files found at {}", .0.display())]
    NoFixtures(PathBuf),
    #[error("unsupported function `{0}`")]
    UnsupportedFunction(String),
    #[error("bad inputs for `{function}`: {reason}")]
    BadInputs { function: String, reason: String },
}

impl HarnessError {
    pub(crate) fn bad_inputs(function: &str, reason: impl Into<String>) -> Self {
        Self::BadInputs {
            function: function.to_string(),
            reason: reason.into(),
        }
    }
}
