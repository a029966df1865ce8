//! Error types for batchflow
//!
//! Provides granular error classification for proper retry handling:
//! - Retriable errors (connection, timeout, deadlock)
//! - Non-retriable errors (validation, schema mismatch, configuration)

use std::fmt;
use thiserror::Error;

/// Result type for batchflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request or schema rejected at submit time
    Validation,
    /// A caller or lifecycle token was cancelled
    Cancellation,
    /// The processor's own per-call deadline elapsed (retriable)
    Timeout,
    /// Backend execution failure (retriability decided by the classifier)
    Backend,
    /// Schema variant incompatible with the processor's backend
    Schema,
    /// Malformed operations or configuration reaching a processor
    Configuration,
}

impl ErrorCategory {
    /// Whether errors in this category are generally worth retrying
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Timeout | Self::Backend)
    }
}

/// Main error type for batchflow
#[derive(Error, Debug)]
pub enum Error {
    /// Schema declares no columns
    #[error("schema has no columns")]
    MissingColumn,

    /// Schema declares the same column more than once
    #[error("duplicate column in schema: {column}")]
    DuplicateColumn {
        /// The repeated column identifier
        column: String,
    },

    /// Schema name is empty
    #[error("schema name is empty")]
    EmptySchemaName,

    /// Requested column has no value on this request
    #[error("column not set: {column}")]
    ColumnNotFound {
        /// The requested column identifier
        column: String,
    },

    /// Stored value does not convert to the requested type
    #[error("type conversion error: {message}")]
    TypeConversion {
        /// What was requested and what was found
        message: String,
    },

    /// A caller or lifecycle token was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The processor's own execute deadline elapsed
    ///
    /// Distinguishable from [`Error::Cancelled`] so the retry classifier can
    /// treat a processor-internal timeout as retriable while an outer
    /// cancellation is terminal.
    #[error("execute batch timeout")]
    ExecuteTimeout,

    /// Processor received a schema variant it cannot serve
    #[error("schema mismatch: expected {expected} schema, got {actual}")]
    SchemaMismatch {
        /// The variant the processor serves
        expected: &'static str,
        /// The variant it was handed
        actual: &'static str,
    },

    /// Operations carried no work
    #[error("empty operations")]
    EmptyOperations,

    /// Operations variant does not match the processor backend
    #[error("invalid operations for this processor")]
    InvalidOperations,

    /// Backend execution failed
    #[error("execution error: {message}")]
    Execution {
        /// Backend-reported failure text
        message: String,
    },

    /// Connection-level failure
    #[error("connection error: {message}")]
    Connection {
        /// Backend-reported failure text
        message: String,
    },

    /// Per-command failures collected from a pipelined key-value batch
    #[error("{} command(s) failed: {}", errors.len(), errors.join("; "))]
    CommandErrors {
        /// One message per failed command, in pipeline order
        errors: Vec<String>,
    },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingColumn
            | Self::DuplicateColumn { .. }
            | Self::EmptySchemaName
            | Self::ColumnNotFound { .. }
            | Self::TypeConversion { .. } => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::ExecuteTimeout => ErrorCategory::Timeout,
            Self::SchemaMismatch { .. } => ErrorCategory::Schema,
            Self::EmptyOperations | Self::InvalidOperations => ErrorCategory::Configuration,
            Self::Execution { .. } | Self::Connection { .. } | Self::CommandErrors { .. } => {
                ErrorCategory::Backend
            }
        }
    }

    /// Whether this error came from a cancelled token
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Cancellation => write!(f, "cancellation"),
            Self::Timeout => write!(f, "timeout"),
            Self::Backend => write!(f, "backend"),
            Self::Schema => write!(f, "schema"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
