//! MySQL dialect driver

use tokio_util::sync::CancellationToken;

use super::{collect_args, column_list, values_clause, SqlDriver};
use crate::error::{Error, Result};
use crate::schema::{ConflictPolicy, Schema};
use crate::types::{RowData, Value};

/// MySQL / MariaDB bulk-insert driver
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

impl SqlDriver for MySqlDriver {
    fn name(&self) -> &'static str {
        "MySQL"
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
                    "INSERT IGNORE INTO {} ({}) VALUES {}",
                    schema.name(),
                    columns,
                    values
                )
            }
            ConflictPolicy::Replace => {
                format!("REPLACE INTO {} ({}) VALUES {}", schema.name(), columns, values)
            }
            ConflictPolicy::Update => {
                let assignments = schema
                    .columns()
                    .iter()
                    .map(|c| format!("{c}=VALUES({c})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
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
