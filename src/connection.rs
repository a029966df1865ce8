//! Backend connection traits consumed by the processors
//!
//! The core never speaks a wire protocol itself; it executes through these
//! seams. Feature-gated adapters for tokio-postgres, mysql_async, and redis
//! live under [`crate::backend`]; anything else (pools, sqlite bindings,
//! test doubles) implements them on the caller's side.

use async_trait::async_trait;

use crate::driver::KvCommand;
use crate::error::Result;
use crate::types::Value;

/// A connection that executes one parameterized SQL statement
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Execute the statement with positional arguments, returning the
    /// affected row count.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64>;
}

/// A connection that executes a batch of commands as one pipeline
#[async_trait]
pub trait KvConnection: Send + Sync {
    /// Issue all commands in one round trip and report per-command results
    /// in pipeline order.
    async fn execute_pipelined(&self, commands: &[KvCommand]) -> Result<Vec<Result<()>>>;
}
