//! # batchflow
//!
//! High-throughput batch insertion for relational and key-value stores.
//!
//! Callers submit individual records; the engine buffers them, groups them
//! by target schema, assembles bulk operations, and executes them under
//! retry and throttling policies, surfacing failures asynchronously.
//!
//! ## Features
//!
//! - **Bounded ingestion**: blocking, cancellation-aware submits into a
//!   bounded buffer with size-or-time flush triggering
//! - **Throttled execution**: semaphore admission control, classified
//!   retries with exponential backoff, in-flight accounting
//! - **Dialect synthesis**: MySQL, PostgreSQL, and SQLite bulk inserts with
//!   conflict policies, plus pipelined key-value command batches
//! - **Metrics**: pluggable reporter with a `metrics`-facade implementation
//! - **Type safety**: typed value set with null-padded column alignment
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batchflow::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let lifecycle = CancellationToken::new();
//! let config = PipelineConfig {
//!     buffer_size: 8192,
//!     flush_size: 1000,
//!     flush_interval: std::time::Duration::from_millis(100),
//!     ..Default::default()
//! };
//!
//! let engine = BatchFlow::mysql(&lifecycle, conn, config);
//! let mut errors = engine.error_chan(64);
//!
//! let users = Schema::relational("users", ConflictPolicy::Ignore, ["id", "name"]);
//! let request = Request::new(users.clone())
//!     .set_int64("id", 1)
//!     .set_string("name", "alice");
//! engine.submit(&CancellationToken::new(), request).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `mysql` - MySQL/MariaDB support via mysql_async
//! - `redis` - Redis support via redis
//! - `full` - All features enabled

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod connection;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod mock;
pub mod pipeline;
pub mod processor;
pub mod request;
pub mod retry;
pub mod schema;
pub mod types;

// Backend wire adapters (conditionally compiled)
pub mod backend;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and row types
    pub use crate::types::{RowData, Value};

    // Schema and request types
    pub use crate::request::Request;
    pub use crate::schema::{ConflictPolicy, Schema, SchemaKind};

    // Engine types
    pub use crate::engine::{BatchFlow, PipelineConfig};

    // Pipeline types
    pub use crate::pipeline::{Pipeline, PipelineOptions};

    // Executor and processor seams
    pub use crate::executor::{BatchExecutor, ThrottledExecutor};
    pub use crate::processor::{BatchProcessor, KvBatchProcessor, Operations, SqlBatchProcessor};

    // Connection seams
    pub use crate::connection::{KvConnection, SqlConnection};

    // Drivers
    pub use crate::driver::{
        driver_for, HashWriteDriver, KvCommand, KvDriver, MySqlDriver, PostgresDriver, SqlDriver,
        SqliteDriver,
    };

    // Retry policy
    pub use crate::retry::{
        backoff_delay, default_retry_classifier, Classification, RetryConfig, RetryReason,
    };

    // Metrics
    pub use crate::metrics::{
        ExecuteStatus, FacadeMetricsReporter, MetricsReporter, NoopMetricsReporter,
        PipelineMetricsReporter,
    };

    // Test support
    pub use crate::mock::MockExecutor;
}

// Re-export commonly used items at crate root
pub use engine::{BatchFlow, PipelineConfig};
pub use error::{Error, Result};
pub use request::Request;
pub use schema::{ConflictPolicy, Schema};
pub use types::Value;
