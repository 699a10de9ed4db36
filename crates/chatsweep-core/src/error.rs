//! Error types for chatsweep

use crate::db::StoreKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SweepError
pub type Result<T> = std::result::Result<T, SweepError>;

/// Error type alias for convenience
pub type Error = SweepError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_INPUT: i32 = 3;
    pub const CONNECTION_FAILED: i32 = 4;
}

/// Main error type for chatsweep
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Cannot connect to {store} database at {url}: {source}")]
    Connection {
        store: StoreKind,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Cannot list uploads directory {}: {source}", .path.display())]
    UploadsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SweepError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidInput(_) | Self::Yaml(_) => exit_codes::INVALID_INPUT,
            Self::Connection { .. } => exit_codes::CONNECTION_FAILED,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
