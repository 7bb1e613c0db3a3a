//! Error types for pipeline operations.
//!
//! Structural failures (unreadable files, missing columns, bad configuration)
//! are fatal and surface as [`EtlError`]. Row-level problems are not errors in
//! this sense: they are collected as rejections by the validator and never
//! abort a run.

use std::path::PathBuf;

/// Result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;

/// Error type for pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema error: missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EtlError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Io { .. } => "io_error",
            EtlError::Schema { .. } => "schema_error",
            EtlError::Csv(_) => "csv_error",
            EtlError::Config(_) => "config_error",
            EtlError::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(self, EtlError::Schema { .. })
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(e: serde_json::Error) -> Self {
        EtlError::Serialization(e.to_string())
    }
}
