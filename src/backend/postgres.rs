//! PostgreSQL wire adapter backed by tokio-postgres

use async_trait::async_trait;

use crate::connection::SqlConnection;
use crate::error::{Error, Result};
use crate::types::Value;

/// Convert a batchflow Value to a tokio-postgres compatible parameter
fn value_to_sql(value: &Value) -> Box<dyn tokio_postgres::types::ToSql + Sync + Send> {
    match value {
        Value::Null => Box::new(Option::<i32>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int8(n) => Box::new(i16::from(*n)), // PostgreSQL has no 1-byte integer
        Value::Int16(n) => Box::new(*n),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Timestamp(ts) => Box::new(*ts),
    }
}

/// [`SqlConnection`] over a tokio-postgres client
pub struct PgConnection {
    client: tokio_postgres::Client,
}

impl PgConnection {
    /// Wrap an established client
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self { client }
    }

    /// The underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
        let boxed_params: Vec<Box<dyn tokio_postgres::types::ToSql + Sync + Send>> =
            args.iter().map(value_to_sql).collect();
        let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = boxed_params
            .iter()
            .map(|b| b.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();

        self.client.execute(sql, &param_refs).await.map_err(|e| {
            if e.is_closed() {
                Error::connection(e.to_string())
            } else {
                Error::execution(e.to_string())
            }
        })
    }
}
