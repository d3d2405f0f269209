use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

use crate::AccessLevel;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("requires {required} access (have {actual})")]
    InsufficientLevel {
        required: AccessLevel,
        actual: AccessLevel,
    },
}

impl From<SecurityError> for (StatusCode, String) {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::InsufficientLevel { .. } => (StatusCode::FORBIDDEN, e.to_string()),
        }
    }
}

/// Failures while loading the group mapping policy. All of them abort start-up.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read group mapping config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse group mapping config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("no group mappings found in config")]
    EmptyMappings,
}
