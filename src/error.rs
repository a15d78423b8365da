//! Error types for dberd.
//!
//! This module defines all error types using `thiserror`. Every stage of the
//! pipeline returns one of these variants rather than panicking, and each kind
//! of failure (connectivity, unsupported capability, type mismatch, cancellation)
//! is a separate variant so callers can tell them apart programmatically.

use std::path::PathBuf;
use thiserror::Error;

/// The step of an extraction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    /// Listing tables and their columns.
    Tables,
    /// Listing foreign-key references.
    References,
}

impl std::fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tables => write!(f, "extracting tables"),
            Self::References => write!(f, "extracting references"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DberdError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("{stage}: {message}")]
    Extraction {
        stage: ExtractionStage,
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Invalid schema: {message} (object: {object})")]
    InvalidSchema { message: String, object: String },

    #[error("{operation} is not supported by the {target} target")]
    Unsupported { target: String, operation: String },

    #[error("{given} format is not supported, {expected} expected")]
    TypeMismatch { given: String, expected: String },

    #[error("Serializing schema as {target} failed: {message}")]
    Serialization { target: String, message: String },

    #[error("Rendering {target} diagram failed: {message}")]
    Render { target: String, message: String },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DberdError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Wrap a driver error raised while running the given extraction stage.
    ///
    /// Connectivity problems keep their own variant; everything else is
    /// attributed to the stage.
    pub fn extraction(stage: ExtractionStage, err: sqlx::Error) -> Self {
        match DberdError::from(err) {
            DberdError::Extraction {
                message, sql_state, ..
            } => DberdError::Extraction {
                stage,
                message,
                sql_state,
            },
            other => other,
        }
    }

    /// Create an extraction error that did not originate in the driver.
    pub fn extraction_message(stage: ExtractionStage, message: impl Into<String>) -> Self {
        Self::Extraction {
            stage,
            message: message.into(),
            sql_state: None,
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            target: target.into(),
            operation: operation.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(given: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            given: given.into(),
            expected: expected.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a render error.
    pub fn render(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an I/O error tied to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Unsupported { .. } => Some("Check the target capabilities before calling it"),
            Self::TypeMismatch { .. } => {
                Some("Pass the formatted schema to the renderer of the same target")
            }
            _ => None,
        }
    }

    /// Check if the whole pipeline may be worth running again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Cancelled { .. }
        )
    }

    /// Check if this error was caused by cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DberdError.
///
/// Errors that are not connectivity related become extraction errors attributed
/// to the table listing; backends re-attribute them with [`DberdError::extraction`].
impl From<sqlx::Error> for DberdError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DberdError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => DberdError::Extraction {
                stage: ExtractionStage::Tables,
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
            },
            sqlx::Error::PoolTimedOut => DberdError::connection(
                "Timed out waiting for a database connection",
                "Check that the database is reachable, or raise --acquire-timeout",
            ),
            sqlx::Error::PoolClosed => {
                DberdError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DberdError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DberdError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DberdError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            other => DberdError::Extraction {
                stage: ExtractionStage::Tables,
                message: other.to_string(),
                sql_state: None,
            },
        }
    }
}

impl From<serde_json::Error> for DberdError {
    fn from(err: serde_json::Error) -> Self {
        DberdError::serialization("json", err.to_string())
    }
}

/// Result type alias for dberd operations.
pub type DberdResult<T> = Result<T, DberdError>;
