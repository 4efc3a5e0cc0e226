//! Custom error types for the catalog refinery pipeline.
//!
//! Only file-level conditions escape the pipeline as errors. Per-cell and
//! per-row anomalies (undecodable bytes, malformed rows, unparseable values,
//! strategies lacking signal) are absorbed by the stage that meets them and
//! show up in logs and in the schema report instead.
//!
//! Errors serialize as `{ code, message }` so callers can forward them as
//! structured values.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the refinery pipeline.
#[derive(Error, Debug)]
pub enum RefineryError {
    /// The source file does not exist. Never retried.
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The source file exists but could not be read at all.
    #[error("Cannot read source file {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every remedy was tried and the file still produced no header row.
    ///
    /// The lossy Latin-1 pass never fails on cell contents; a body with no
    /// header row (an empty file, for instance) has no
    /// table to return under any encoding and is reported here instead.
    #[error("Cannot read {} despite trying: {}", path.display(), attempted.join(", "))]
    ReadExhausted {
        path: PathBuf,
        attempted: Vec<String>,
    },

    /// Column was not found in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Imputation failed.
    #[error("Failed to impute missing values in column '{column}': {reason}")]
    ImputationFailed { column: String, reason: String },

    /// A pipeline stage failed for a reason not covered above.
    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV tokenizer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RefineryError>,
    },
}

impl RefineryError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RefineryError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap a stage-internal failure.
    pub fn stage(stage: impl Into<String>, reason: impl ToString) -> Self {
        RefineryError::StageFailed {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// Get a stable error code for callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Self::SourceUnreadable { .. } => "SOURCE_UNREADABLE",
            Self::ReadExhausted { .. } => "READ_EXHAUSTED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ImputationFailed { .. } => "IMPUTATION_FAILED",
            Self::StageFailed { .. } => "STAGE_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the error is an unrecoverable input condition (the run
    /// cannot even start reading).
    pub fn is_unrecoverable_input(&self) -> bool {
        match self {
            Self::SourceNotFound(_) | Self::SourceUnreadable { .. } => true,
            Self::WithContext { source, .. } => source.is_unrecoverable_input(),
            _ => false,
        }
    }
}

impl Serialize for RefineryError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("RefineryError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for refinery operations.
pub type Result<T> = std::result::Result<T, RefineryError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RefineryError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            RefineryError::SourceNotFound(PathBuf::from("x.csv")).error_code(),
            "SOURCE_NOT_FOUND"
        );
        assert_eq!(
            RefineryError::ColumnNotFound("price".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[test]
    fn test_source_not_found_names_file() {
        let error = RefineryError::SourceNotFound(PathBuf::from("data/missing.csv"));
        assert!(error.to_string().contains("data/missing.csv"));
        assert!(error.is_unrecoverable_input());
    }

    #[test]
    fn test_read_exhausted_lists_remedies() {
        let error = RefineryError::ReadExhausted {
            path: PathBuf::from("dump.csv"),
            attempted: vec!["utf-8 (strict)".to_string(), "latin-1 (permissive)".to_string()],
        };
        let message = error.to_string();
        assert!(message.contains("dump.csv"));
        assert!(message.contains("utf-8 (strict)"));
        assert!(message.contains("latin-1 (permissive)"));
        assert!(!error.is_unrecoverable_input());
    }

    #[test]
    fn test_error_serialization() {
        let error = RefineryError::ColumnNotFound("Price".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Price"));
    }

    #[test]
    fn test_with_context() {
        let error = RefineryError::SourceNotFound(PathBuf::from("a.csv")).with_context("Reading");
        assert!(error.to_string().contains("Reading"));
        assert_eq!(error.error_code(), "SOURCE_NOT_FOUND"); // Preserves original code
        assert!(error.is_unrecoverable_input());
    }
}
