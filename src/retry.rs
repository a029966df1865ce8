//! Retry policy: configuration, error classification, backoff
//!
//! Classification is a pluggable function `(err) -> Classification` with the
//! canonical default below. The default's substring catalog is deliberately
//! conservative; deployments that know their backend's error text should
//! install a backend-aware classifier via
//! [`ThrottledExecutor::with_retry_classifier`](crate::executor::ThrottledExecutor::with_retry_classifier).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::Error;

/// Retry configuration
///
/// The zero value (`enabled = false`) disables retries entirely: one attempt
/// per batch, no `retry:*` counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether the retry loop runs at all
    pub enabled: bool,
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles each retry
    pub backoff_base: Duration,
    /// Upper bound on any single backoff sleep
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Enabled config with the given attempt budget
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            enabled: true,
            max_attempts,
            ..Self::default()
        }
    }
}

/// Why an error was (or was not) scheduled for another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryReason {
    /// Deadlock reported by the backend
    Deadlock,
    /// Lock wait timed out
    LockTimeout,
    /// Generic timeout in the backend error text
    Timeout,
    /// Connection reset, refused, or closed
    Connection,
    /// I/O failure
    Io,
    /// The caller's token was cancelled — never retried
    Context,
    /// The processor's own per-call deadline elapsed
    ProcessorTimeout,
    /// Everything else — never retried
    NonRetryable,
}

impl RetryReason {
    /// Label text used in `retry:<reason>` / `final:<reason>` counters
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deadlock => "deadlock",
            Self::LockTimeout => "lock_timeout",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Io => "io",
            Self::Context => "context",
            Self::ProcessorTimeout => "processor_timeout",
            Self::NonRetryable => "non_retryable",
        }
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict for one error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Whether another attempt is permitted
    pub retryable: bool,
    /// The reason label
    pub reason: RetryReason,
}

impl Classification {
    /// A retryable verdict
    pub const fn retry(reason: RetryReason) -> Self {
        Self {
            retryable: true,
            reason,
        }
    }

    /// A terminal verdict
    pub const fn terminal(reason: RetryReason) -> Self {
        Self {
            retryable: false,
            reason,
        }
    }
}

/// The canonical default classifier.
///
/// Structured variants are matched first; backend error text falls through
/// to substring matching, most specific pattern first.
pub fn default_retry_classifier(err: &Error) -> Classification {
    match err {
        Error::Cancelled => Classification::terminal(RetryReason::Context),
        Error::ExecuteTimeout => Classification::retry(RetryReason::ProcessorTimeout),
        Error::SchemaMismatch { .. }
        | Error::EmptyOperations
        | Error::InvalidOperations
        | Error::MissingColumn
        | Error::DuplicateColumn { .. }
        | Error::EmptySchemaName
        | Error::ColumnNotFound { .. }
        | Error::TypeConversion { .. } => Classification::terminal(RetryReason::NonRetryable),
        Error::Connection { .. } => Classification::retry(RetryReason::Connection),
        Error::Execution { .. } | Error::CommandErrors { .. } => classify_text(&err.to_string()),
    }
}

fn classify_text(message: &str) -> Classification {
    let text = message.to_ascii_lowercase();

    if text.contains("deadlock") {
        return Classification::retry(RetryReason::Deadlock);
    }
    if text.contains("lock wait timeout") || text.contains("lock timeout") {
        return Classification::retry(RetryReason::LockTimeout);
    }
    if text.contains("connection refused")
        || text.contains("connection reset")
        || text.contains("connection closed")
        || text.contains("broken pipe")
    {
        return Classification::retry(RetryReason::Connection);
    }
    if text.contains("i/o timeout") || text.contains("i/o error") || text.contains("io error") {
        return Classification::retry(RetryReason::Io);
    }
    if text.contains("timeout") || text.contains("timed out") {
        return Classification::retry(RetryReason::Timeout);
    }

    Classification::terminal(RetryReason::NonRetryable)
}

/// Backoff before the attempt following `attempt` (1-based):
/// `min(backoff_base * 2^(attempt-1), max_backoff)`. Pure.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}
