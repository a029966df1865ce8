//! MySQL wire adapter backed by mysql_async

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::Queryable;

use crate::connection::SqlConnection;
use crate::error::{Error, Result};
use crate::types::Value;

/// Convert a batchflow Value to a mysql_async value
fn value_to_mysql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::from(*b),
        Value::Int8(n) => mysql_async::Value::from(*n),
        Value::Int16(n) => mysql_async::Value::from(*n),
        Value::Int32(n) => mysql_async::Value::from(*n),
        Value::Int64(n) => mysql_async::Value::from(*n),
        Value::Float32(n) => mysql_async::Value::from(*n),
        Value::Float64(n) => mysql_async::Value::from(*n),
        Value::String(s) => mysql_async::Value::from(s.clone()),
        Value::Bytes(b) => mysql_async::Value::from(b.clone()),
        Value::Timestamp(ts) => {
            let naive = ts.naive_utc();
            let date = naive.date();
            let time = naive.time();
            mysql_async::Value::Date(
                date.year() as u16,
                date.month() as u8,
                date.day() as u8,
                time.hour() as u8,
                time.minute() as u8,
                time.second() as u8,
                time.nanosecond() / 1000,
            )
        }
    }
}

/// [`SqlConnection`] over a mysql_async pool
pub struct MySqlConnection {
    pool: mysql_async::Pool,
}

impl MySqlConnection {
    /// Wrap an established pool
    pub fn new(pool: mysql_async::Pool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &mysql_async::Pool {
        &self.pool
    }
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        let params = if args.is_empty() {
            mysql_async::Params::Empty
        } else {
            mysql_async::Params::Positional(args.iter().map(value_to_mysql).collect())
        };

        conn.exec_drop(sql, params)
            .await
            .map_err(|e| Error::execution(e.to_string()))?;
        Ok(conn.affected_rows())
    }
}
