//! Backend-specific command synthesizers
//!
//! Drivers are pure and stateless: given a schema and an ordered list of row
//! maps they produce either one parameterized bulk statement (relational) or
//! a list of discrete commands (key-value). They hold no connection and are
//! freely shared behind `Arc`.
//!
//! - [`MySqlDriver`]: `INSERT IGNORE` / `REPLACE INTO` / `ON DUPLICATE KEY`
//! - [`PostgresDriver`]: `ON CONFLICT` forms with `$n` placeholders
//! - [`SqliteDriver`]: `INSERT OR IGNORE` / `INSERT OR REPLACE`
//! - [`HashWriteDriver`]: one hash-write command per row

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::{RowData, Value};

mod kv;
mod mysql;
mod postgres;
mod sqlite;

pub use kv::HashWriteDriver;
pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// SQL statement synthesizer for one relational dialect
pub trait SqlDriver: Send + Sync {
    /// Dialect name
    fn name(&self) -> &'static str;

    /// Placeholder text for the 1-based positional parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// Produce one parameterized bulk insert for `rows`.
    ///
    /// Empty `rows` yields an empty statement and no arguments, without
    /// error. A cancelled token yields [`Error::Cancelled`]. Arguments are
    /// laid out row-major, one per declared column per row; columns absent
    /// from a row are bound as NULL.
    fn generate_insert_sql(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<(String, Vec<Value>)>;
}

/// Command synthesizer for a key-value backend
pub trait KvDriver: Send + Sync {
    /// Driver name
    fn name(&self) -> &'static str;

    /// Produce the ordered command list for `rows`.
    ///
    /// Empty `rows` yields an empty list; a cancelled token yields
    /// [`Error::Cancelled`].
    fn generate_cmds(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<Vec<KvCommand>>;
}

/// One discrete key-value command: an opaque argv tuple
#[derive(Debug, Clone, PartialEq)]
pub struct KvCommand(Vec<Value>);

impl KvCommand {
    /// Build a command from its argv
    pub fn new(argv: Vec<Value>) -> Self {
        Self(argv)
    }

    /// The argv, command name first
    #[inline]
    pub fn args(&self) -> &[Value] {
        &self.0
    }

    /// Whether the command carries no argv at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for KvCommand {
    fn from(argv: Vec<Value>) -> Self {
        Self(argv)
    }
}

/// Get a driver instance by backend name. Unrecognized names default to
/// PostgreSQL.
pub fn driver_for(name: &str) -> Arc<dyn SqlDriver> {
    match name.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" => Arc::new(MySqlDriver),
        "sqlite" | "sqlite3" => Arc::new(SqliteDriver),
        _ => Arc::new(PostgresDriver),
    }
}

/// Comma-joined declared column list
pub(crate) fn column_list(schema: &Schema) -> String {
    schema.columns().join(", ")
}

/// `(?, ?), (?, ?)`-style VALUES groups, numbering placeholders row-major
pub(crate) fn values_clause(
    driver: &dyn SqlDriver,
    row_count: usize,
    column_count: usize,
) -> String {
    let mut clause = String::new();
    let mut index = 1;
    for row in 0..row_count {
        if row > 0 {
            clause.push_str(", ");
        }
        clause.push('(');
        for column in 0..column_count {
            if column > 0 {
                clause.push_str(", ");
            }
            clause.push_str(&driver.placeholder(index));
            index += 1;
        }
        clause.push(')');
    }
    clause
}

/// Row-major argument collection: one entry per declared column per row,
/// NULL where the row carries no value. Re-checks the token every 1000 rows
/// so huge batches stay responsive to cancellation.
pub(crate) fn collect_args(
    ctx: &CancellationToken,
    schema: &Schema,
    rows: &[RowData],
) -> Result<Vec<Value>> {
    let columns = schema.columns();
    let mut args = Vec::with_capacity(rows.len() * columns.len());
    for (i, row) in rows.iter().enumerate() {
        if i % 1000 == 0 && ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        for column in columns {
            args.push(row.get(column).cloned().unwrap_or(Value::Null));
        }
    }
    Ok(args)
}
