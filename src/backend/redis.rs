//! Redis wire adapter

use async_trait::async_trait;

use crate::connection::KvConnection;
use crate::driver::KvCommand;
use crate::error::{Error, Result};
use crate::types::Value;

fn append_arg(cmd: &mut redis::Pipeline, value: &Value) {
    match value {
        Value::Null => cmd.arg(""),
        Value::Bool(b) => cmd.arg(i32::from(*b)),
        Value::Int8(n) => cmd.arg(*n),
        Value::Int16(n) => cmd.arg(*n),
        Value::Int32(n) => cmd.arg(*n),
        Value::Int64(n) => cmd.arg(*n),
        Value::Float32(n) => cmd.arg(*n),
        Value::Float64(n) => cmd.arg(*n),
        Value::String(s) => cmd.arg(s.as_str()),
        Value::Bytes(b) => cmd.arg(b.as_slice()),
        Value::Timestamp(ts) => cmd.arg(ts.to_rfc3339()),
    };
}

/// [`KvConnection`] over a redis connection manager
pub struct RedisConnection {
    manager: redis::aio::ConnectionManager,
}

impl RedisConnection {
    /// Wrap an established connection manager
    pub fn new(manager: redis::aio::ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl KvConnection for RedisConnection {
    async fn execute_pipelined(&self, commands: &[KvCommand]) -> Result<Vec<Result<()>>> {
        let mut pipe = redis::pipe();
        for command in commands {
            let mut argv = command.args().iter();
            let name = argv
                .next()
                .and_then(Value::as_string)
                .ok_or(Error::EmptyOperations)?;
            pipe.cmd(&name);
            for arg in argv {
                append_arg(&mut pipe, arg);
            }
        }

        let mut manager = self.manager.clone();
        // Transport failures abort the whole pipeline; per-command failures
        // come back in-slot as server errors and are reported per entry.
        let replies: Vec<redis::Value> = pipe
            .query_async(&mut manager)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                redis::Value::ServerError(err) => {
                    Err(Error::execution(redis::RedisError::from(err).to_string()))
                }
                _ => Ok(()),
            })
            .collect())
    }
}
