//! Error types for rig-ingest
//!
//! One variant per failure class: format selection, structural preconditions,
//! identity derivation, storage, and database access. Optional-enrichment
//! failures (weight sheet, numeric coercion of optional fields) never surface
//! here; they degrade to `None` at the call site.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// rig-ingest error types
#[derive(Error, Debug)]
pub enum Error {
    /// No stimlog format detector matched the file
    #[error("unrecognized log format: {}\nNone of the registered stimlog formats matched", path.display())]
    UnrecognizedFormat {
        /// Log file that no detector accepted
        path: PathBuf,
    },

    /// A detector accepted the file but a line failed to parse
    #[error("parse error in {} (line {line}): {message}", path.display())]
    Parse {
        /// Log file being parsed
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What went wrong on that line
        message: String,
    },

    /// Stimlog/riglog run counts differ (precondition violation)
    #[error("run count mismatch: {stimlogs} stimlog(s) vs {riglogs} riglog(s)")]
    RunCountMismatch {
        /// Number of stimlog paths supplied
        stimlogs: usize,
        /// Number of riglog paths supplied
        riglogs: usize,
    },

    /// Session identity could not be derived
    #[error("failed to create session id for {session_dir}: {reason}")]
    SessionId {
        /// Session directory whose identity derivation failed
        session_dir: String,
        /// Why derivation failed (no digits in animal id, missing field, ...)
        reason: String,
    },

    /// A required field was absent where the data model demands it
    #[error("missing required field `{0}`")]
    MissingField(String),

    /// Saved-data storage error (Parquet/Arrow/MAT)
    #[error("storage error: {0}")]
    Storage(String),

    /// Flat-file database error
    #[error("database error: {0}")]
    Database(String),

    /// Path resolution error (session dir, protocol file, run dirs)
    #[error("path error: {0}")]
    Path(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_count_mismatch_message() {
        let err = Error::RunCountMismatch {
            stimlogs: 3,
            riglogs: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 stimlog"));
        assert!(msg.contains("2 riglog"));
    }

    #[test]
    fn test_session_id_error_names_directory() {
        let err = Error::SessionId {
            session_dir: "230615_KC045_detect_AB".to_string(),
            reason: "animal id contains no digits".to_string(),
        };
        assert!(err.to_string().contains("230615_KC045_detect_AB"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
