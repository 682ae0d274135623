//! Error types for trackview-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackviewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// An artifact listing addressed a path that is not a loaded directory.
    #[error("Invalid artifact path {path:?} for run {run_uuid}: {reason}")]
    ArtifactPath {
        run_uuid: String,
        path: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, TrackviewError>;

/// Error code reported by the tracking server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ResourceDoesNotExist,
    InvalidParameterValue,
    PermissionDenied,
    InternalError,
    #[serde(other)]
    Unknown,
}

/// Failure of a single call against the tracking server.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{error_code:?}: {message}")]
pub struct ApiError {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: Some(404),
            ..Self::new(ErrorCode::ResourceDoesNotExist, message)
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.error_code == ErrorCode::ResourceDoesNotExist
    }
}
