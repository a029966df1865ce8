//! Test support: a recording executor with no backend
//!
//! [`MockExecutor`] implements [`BatchExecutor`] by recording every batch it
//! receives. Optionally it carries a [`SqlDriver`] and also records the
//! statement that driver generates for each batch, which makes driver output
//! assertable through the full engine path without a database.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::driver::SqlDriver;
use crate::error::{Error, Result};
use crate::executor::BatchExecutor;
use crate::schema::Schema;
use crate::types::{RowData, Value};

/// Recording executor for tests
#[derive(Default)]
pub struct MockExecutor {
    batches: Mutex<Vec<(Arc<Schema>, Vec<RowData>)>>,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    driver: Option<Arc<dyn SqlDriver>>,
    failure: Mutex<Option<String>>,
}

impl MockExecutor {
    /// A mock that records batches and always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that additionally records the SQL `driver` generates per batch
    pub fn with_driver(driver: Arc<dyn SqlDriver>) -> Self {
        Self {
            driver: Some(driver),
            ..Self::default()
        }
    }

    /// Make every subsequent `execute_batch` fail with this message
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Clear a previously set failure
    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    /// Snapshot of every executed batch, in execution order
    pub fn executed_batches(&self) -> Vec<(Arc<Schema>, Vec<RowData>)> {
        self.batches.lock().clone()
    }

    /// Total rows across every executed batch
    pub fn total_rows(&self) -> usize {
        self.batches.lock().iter().map(|(_, rows)| rows.len()).sum()
    }

    /// Snapshot of the statements the attached driver generated
    pub fn generated_statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().clone()
    }
}

#[async_trait]
impl BatchExecutor for MockExecutor {
    async fn execute_batch(
        &self,
        ctx: &CancellationToken,
        schema: &Arc<Schema>,
        rows: Vec<RowData>,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(Error::execution(message));
        }

        if let Some(driver) = &self.driver {
            if schema.is_relational() {
                let (sql, args) = driver.generate_insert_sql(ctx, schema, &rows)?;
                self.statements.lock().push((sql, args));
            }
        }

        self.batches.lock().push((Arc::clone(schema), rows));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MySqlDriver;
    use crate::schema::ConflictPolicy;

    fn row(id: i64) -> RowData {
        RowData::from([("id".to_string(), Value::Int64(id))])
    }

    #[tokio::test]
    async fn test_records_batches() {
        let executor = MockExecutor::new();
        let schema = Schema::relational("t", ConflictPolicy::Ignore, ["id"]);
        let ctx = CancellationToken::new();

        executor
            .execute_batch(&ctx, &schema, vec![row(1), row(2)])
            .await
            .unwrap();

        assert_eq!(executor.executed_batches().len(), 1);
        assert_eq!(executor.total_rows(), 2);
    }

    #[tokio::test]
    async fn test_records_driver_statements() {
        let executor = MockExecutor::with_driver(Arc::new(MySqlDriver));
        let schema = Schema::relational("t", ConflictPolicy::Ignore, ["id"]);
        let ctx = CancellationToken::new();

        executor.execute_batch(&ctx, &schema, vec![row(1)]).await.unwrap();

        let statements = executor.generated_statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].0.contains("INSERT IGNORE INTO t"));
        assert_eq!(statements[0].1, vec![Value::Int64(1)]);
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let executor = MockExecutor::new();
        let schema = Schema::relational("t", ConflictPolicy::Ignore, ["id"]);
        executor.fail_with("deadlock detected");

        let err = executor
            .execute_batch(&CancellationToken::new(), &schema, vec![row(1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deadlock"));

        executor.succeed();
        executor
            .execute_batch(&CancellationToken::new(), &schema, vec![row(1)])
            .await
            .unwrap();
    }
}
