use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized format: no source format matches columns [{}]", headers.join(", "))]
    UnrecognizedFormat { headers: Vec<String> },

    #[error("Failed to read {path}: {message}")]
    ReadFailure { path: PathBuf, message: String },

    #[error("Store write failed, batch rolled back: {0}")]
    StoreWriteFailure(String),

    #[error("Rows committed but {path} could not be moved to processed: {message}")]
    ArchiveFailure { path: PathBuf, message: String },

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

impl EtlError {
    /// Short stable label used when grouping failures in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::UnrecognizedFormat { .. } => "unrecognized_format",
            EtlError::ReadFailure { .. } | EtlError::Io(_) | EtlError::Csv(_) => "read_failure",
            EtlError::StoreWriteFailure(_) | EtlError::Store(_) => "store_write_failure",
            EtlError::ArchiveFailure { .. } => "archive_failure",
            EtlError::Config(_) | EtlError::ConfigSource(_) | EtlError::Validation(_) => "config",
            EtlError::Json(_) => "json",
            EtlError::MissingData(_) => "missing_data",
            EtlError::InvalidFormat(_) => "invalid_format",
        }
    }
}
