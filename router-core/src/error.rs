use serde_json::Error as JsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Storage error: {0}")]
    Storage(#[from] SqlxError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for RouterError {
    fn from(err: anyhow::Error) -> Self {
        RouterError::Unknown(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
