//! Key-value command driver

use tokio_util::sync::CancellationToken;

use super::{KvCommand, KvDriver};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::{RowData, Value};

/// Hash-write driver: one `HSET` per row.
///
/// The first declared column is the key column; the command key is
/// `{schema name}:{key value}`. Remaining columns become field/value pairs;
/// null or absent fields are skipped. A row whose key column is null or
/// absent is an error, and a row with no writable fields produces no
/// command.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashWriteDriver;

impl KvDriver for HashWriteDriver {
    fn name(&self) -> &'static str {
        "HashWrite"
    }

    fn generate_cmds(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<Vec<KvCommand>> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if schema.columns().is_empty() {
            return Err(Error::MissingColumn);
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let columns = schema.columns();
        let key_column = &columns[0];
        let mut commands = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            if i % 1000 == 0 && ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let key_value = match row.get(key_column) {
                Some(value) if !value.is_null() => value,
                _ => {
                    return Err(Error::ColumnNotFound {
                        column: key_column.clone(),
                    })
                }
            };
            let key_text = key_value.as_string().ok_or_else(|| Error::TypeConversion {
                message: format!("key column {key_column} is not text-representable"),
            })?;

            let mut argv = Vec::with_capacity(2 + (columns.len() - 1) * 2);
            argv.push(Value::String("HSET".into()));
            argv.push(Value::String(format!("{}:{}", schema.name(), key_text)));
            for column in &columns[1..] {
                match row.get(column) {
                    Some(value) if !value.is_null() => {
                        argv.push(Value::String(column.clone()));
                        argv.push(value.clone());
                    }
                    _ => {}
                }
            }

            // HSET requires at least one field/value pair
            if argv.len() > 2 {
                commands.push(KvCommand::new(argv));
            }
        }

        Ok(commands)
    }
}
