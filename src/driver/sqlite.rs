//! SQLite dialect driver

use tokio_util::sync::CancellationToken;

use super::{collect_args, column_list, values_clause, SqlDriver};
use crate::error::{Error, Result};
use crate::schema::{ConflictPolicy, Schema};
use crate::types::{RowData, Value};

/// SQLite bulk-insert driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqlDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn generate_insert_sql(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<(String, Vec<Value>)> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if schema.columns().is_empty() {
            return Err(Error::MissingColumn);
        }
        if rows.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let columns = column_list(schema);
        let values = values_clause(self, rows.len(), schema.columns().len());
        let policy = schema.policy().unwrap_or_default();

        let sql = match policy {
            ConflictPolicy::Insert => {
                format!("INSERT INTO {} ({}) VALUES {}", schema.name(), columns, values)
            }
            ConflictPolicy::Ignore => {
                format!(
                    "INSERT OR IGNORE INTO {} ({}) VALUES {}",
                    schema.name(),
                    columns,
                    values
                )
            }
            ConflictPolicy::Replace => {
                format!(
                    "INSERT OR REPLACE INTO {} ({}) VALUES {}",
                    schema.name(),
                    columns,
                    values
                )
            }
            ConflictPolicy::Update => {
                let assignments = schema
                    .columns()
                    .iter()
                    .map(|c| format!("{c}=excluded.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO UPDATE SET {}",
                    schema.name(),
                    columns,
                    values,
                    assignments
                )
            }
        };

        let args = collect_args(ctx, schema, rows)?;
        Ok((sql, args))
    }
}
