use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Sidebar parse error: {0}")]
    Parse(String),

    #[error("Invalid work item: {0}")]
    Validation(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Content did not become ready within {0:.1}s")]
    ContentTimeout(f64),

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Parallel stage failed: {0}")]
    Pool(String),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for ScrapeError {
    fn from(e: config::ConfigError) -> Self {
        ScrapeError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
