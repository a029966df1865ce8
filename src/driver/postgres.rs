//! PostgreSQL dialect driver

use tokio_util::sync::CancellationToken;

use super::{collect_args, column_list, values_clause, SqlDriver};
use crate::error::{Error, Result};
use crate::schema::{ConflictPolicy, Schema};
use crate::types::{RowData, Value};

/// PostgreSQL bulk-insert driver with `$n` placeholders.
///
/// Upsert forms take the first declared column as the conflict target.
/// `Replace` has no native PostgreSQL rendition and resolves to the same
/// upsert-on-key form as `Update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl SqlDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
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
        let base = format!("INSERT INTO {} ({}) VALUES {}", schema.name(), columns, values);
        let policy = schema.policy().unwrap_or_default();

        let sql = match policy {
            ConflictPolicy::Insert => base,
            ConflictPolicy::Ignore => format!("{base} ON CONFLICT DO NOTHING"),
            ConflictPolicy::Replace | ConflictPolicy::Update => {
                let key = &schema.columns()[0];
                let assignments = schema
                    .columns()
                    .iter()
                    .skip(1)
                    .map(|c| format!("{c}=EXCLUDED.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                if assignments.is_empty() {
                    // Single-column target: nothing to update on conflict
                    format!("{base} ON CONFLICT ({key}) DO NOTHING")
                } else {
                    format!("{base} ON CONFLICT ({key}) DO UPDATE SET {assignments}")
                }
            }
        };

        let args = collect_args(ctx, schema, rows)?;
        Ok((sql, args))
    }
}
