use thiserror::Error;
use tokio::task::JoinError;

use crate::utils::ingest_limits::IngestValidationError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid task transition: {from} -> {event}")]
    InvalidTransition { from: String, event: String },
    #[error("Task {0} has already reached a terminal status")]
    TaskTerminal(String),
    #[error("Backend API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Live update channel error: {0}")]
    Channel(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl From<IngestValidationError> for AppError {
    fn from(err: IngestValidationError) -> Self {
        match err {
            IngestValidationError::PayloadTooLarge(message)
            | IngestValidationError::BadRequest(message) => AppError::Validation(message),
        }
    }
}
