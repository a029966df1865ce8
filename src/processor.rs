//! Batch processors: one-shot synthesize + execute against one backend
//!
//! A processor pairs a [driver](crate::driver) with a connection handle and
//! an optional per-call timeout. When the timeout elapses the processor
//! returns the [`Error::ExecuteTimeout`] sentinel rather than a cancellation
//! error, which is what lets the executor's retry classifier treat a
//! processor-internal timeout as retriable while an outer cancellation stays
//! terminal.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::connection::{KvConnection, SqlConnection};
use crate::driver::{KvCommand, KvDriver, SqlDriver};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::{RowData, Value};

/// Backend-neutral carrier of one synthesized batch
#[derive(Debug, Clone, PartialEq)]
pub enum Operations {
    /// One parameterized statement with positional arguments (relational)
    Statement {
        /// Statement text
        sql: String,
        /// Positional arguments, row-major
        args: Vec<Value>,
    },
    /// An ordered list of discrete commands (key-value)
    Commands(Vec<KvCommand>),
}

impl Operations {
    /// Whether the carrier holds no executable work
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Statement { sql, .. } => sql.is_empty(),
            Self::Commands(commands) => commands.is_empty(),
        }
    }
}

/// Synthesize-then-execute seam consumed by the executor
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Turn a schema group into backend operations
    async fn generate_operations(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<Operations>;

    /// Execute previously synthesized operations
    async fn execute_operations(
        &self,
        ctx: &CancellationToken,
        operations: Operations,
    ) -> Result<()>;
}

/// Race a backend call against the caller token and an optional per-call
/// deadline. Deadline elapse yields the `ExecuteTimeout` sentinel.
async fn run_with_deadline<T, F>(
    ctx: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(deadline) => {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(Error::Cancelled),
                outcome = tokio::time::timeout(deadline, fut) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(Error::ExecuteTimeout),
                },
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(Error::Cancelled),
                result = fut => result,
            }
        }
    }
}

/// Processor for relational backends
pub struct SqlBatchProcessor<C> {
    conn: C,
    driver: Arc<dyn SqlDriver>,
    timeout: Option<Duration>,
}

impl<C: SqlConnection> SqlBatchProcessor<C> {
    /// Pair a connection with a dialect driver
    pub fn new(conn: C, driver: Arc<dyn SqlDriver>) -> Self {
        Self {
            conn,
            driver,
            timeout: None,
        }
    }

    /// Bound every execute call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<C: SqlConnection> BatchProcessor for SqlBatchProcessor<C> {
    async fn generate_operations(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<Operations> {
        if !schema.is_relational() {
            return Err(Error::SchemaMismatch {
                expected: "relational",
                actual: schema.kind().name(),
            });
        }

        let (sql, args) = self.driver.generate_insert_sql(ctx, schema, rows)?;
        Ok(Operations::Statement { sql, args })
    }

    async fn execute_operations(
        &self,
        ctx: &CancellationToken,
        operations: Operations,
    ) -> Result<()> {
        let Operations::Statement { sql, args } = operations else {
            return Err(Error::InvalidOperations);
        };
        if sql.is_empty() {
            return Err(Error::EmptyOperations);
        }

        run_with_deadline(ctx, self.timeout, async {
            self.conn.execute(&sql, &args).await.map(|_| ())
        })
        .await
    }
}

/// Processor for key-value backends
pub struct KvBatchProcessor<C> {
    conn: C,
    driver: Arc<dyn KvDriver>,
    timeout: Option<Duration>,
}

impl<C: KvConnection> KvBatchProcessor<C> {
    /// Pair a connection with a command driver
    pub fn new(conn: C, driver: Arc<dyn KvDriver>) -> Self {
        Self {
            conn,
            driver,
            timeout: None,
        }
    }

    /// Bound every execute call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<C: KvConnection> BatchProcessor for KvBatchProcessor<C> {
    async fn generate_operations(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<Operations> {
        if schema.is_relational() {
            return Err(Error::SchemaMismatch {
                expected: "key-value",
                actual: schema.kind().name(),
            });
        }

        let commands = self.driver.generate_cmds(ctx, schema, rows)?;
        Ok(Operations::Commands(commands))
    }

    async fn execute_operations(
        &self,
        ctx: &CancellationToken,
        operations: Operations,
    ) -> Result<()> {
        let Operations::Commands(commands) = operations else {
            return Err(Error::InvalidOperations);
        };
        if commands.is_empty() {
            return Err(Error::EmptyOperations);
        }

        // Bail out early rather than paying for a batch the caller no
        // longer wants: every command for small batches, every 1000 for
        // large ones.
        let large = commands.len() > 1000;
        for (i, command) in commands.iter().enumerate() {
            if (!large || i % 1000 == 0) && ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if command.is_empty() {
                return Err(Error::EmptyOperations);
            }
        }

        let results =
            run_with_deadline(ctx, self.timeout, self.conn.execute_pipelined(&commands)).await?;

        let errors: Vec<String> = results
            .into_iter()
            .filter_map(|result| result.err().map(|e| e.to_string()))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::CommandErrors { errors })
        }
    }
}
