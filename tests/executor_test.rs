//! Concurrency and accounting tests for the throttled executor

use async_trait::async_trait;
use batchflow::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct OkProcessor {
    delay: Duration,
}

#[async_trait]
impl BatchProcessor for OkProcessor {
    async fn generate_operations(
        &self,
        _ctx: &CancellationToken,
        _schema: &Schema,
        _rows: &[RowData],
    ) -> Result<Operations> {
        Ok(Operations::Statement {
            sql: "stmt".into(),
            args: Vec::new(),
        })
    }

    async fn execute_operations(
        &self,
        _ctx: &CancellationToken,
        _operations: Operations,
    ) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

#[derive(Default)]
struct InflightMetrics {
    current: Mutex<i32>,
    max: Mutex<i32>,
}

impl InflightMetrics {
    fn peak(&self) -> i32 {
        *self.max.lock()
    }
    fn current(&self) -> i32 {
        *self.current.lock()
    }
}

impl MetricsReporter for InflightMetrics {
    fn observe_enqueue_latency(&self, _d: Duration) {}
    fn observe_batch_assemble(&self, _d: Duration) {}
    fn observe_batch_size(&self, _n: usize) {}
    fn observe_execute_duration(&self, _t: &str, _n: usize, _d: Duration, _s: ExecuteStatus) {}
    fn set_concurrency(&self, _n: usize) {}
    fn set_queue_length(&self, _n: usize) {}
    fn inc_inflight(&self) {
        let mut current = self.current.lock();
        *current += 1;
        let mut max = self.max.lock();
        if *current > *max {
            *max = *current;
        }
    }
    fn dec_inflight(&self) {
        *self.current.lock() -= 1;
    }
    fn inc_error(&self, _table: &str, _kind: &str) {}
}

fn schema() -> Arc<Schema> {
    Schema::relational("users", ConflictPolicy::Ignore, ["id"])
}

fn row(n: i64) -> Vec<RowData> {
    vec![RowData::from([("id".to_string(), Value::Int64(n))])]
}

#[tokio::test]
async fn test_inflight_returns_to_zero() {
    let metrics = Arc::new(InflightMetrics::default());
    let executor = Arc::new(
        ThrottledExecutor::new(OkProcessor {
            delay: Duration::from_millis(2),
        })
        .with_metrics_reporter(Arc::clone(&metrics) as Arc<dyn MetricsReporter>),
    );

    let mut handles = Vec::new();
    for n in 0..20_i64 {
        let executor = Arc::clone(&executor);
        let schema = schema();
        handles.push(tokio::spawn(async move {
            executor
                .execute_batch(&CancellationToken::new(), &schema, row(n))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(metrics.current(), 0);
    assert!(metrics.peak() > 0);
}

#[tokio::test]
async fn test_concurrency_limit_respected() {
    let metrics = Arc::new(InflightMetrics::default());
    let executor = Arc::new(
        ThrottledExecutor::new(OkProcessor {
            delay: Duration::from_millis(30),
        })
        .with_concurrency_limit(2)
        .with_metrics_reporter(Arc::clone(&metrics) as Arc<dyn MetricsReporter>),
    );

    let mut handles = Vec::new();
    for n in 0..8_i64 {
        let executor = Arc::clone(&executor);
        let schema = schema();
        handles.push(tokio::spawn(async move {
            executor
                .execute_batch(&CancellationToken::new(), &schema, row(n))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(metrics.peak() <= 2, "peak inflight {}", metrics.peak());
    assert_eq!(metrics.current(), 0);
}

#[tokio::test]
async fn test_unlimited_when_limit_zero() {
    let metrics = Arc::new(InflightMetrics::default());
    let executor = Arc::new(
        ThrottledExecutor::new(OkProcessor {
            delay: Duration::from_millis(30),
        })
        .with_concurrency_limit(0)
        .with_metrics_reporter(Arc::clone(&metrics) as Arc<dyn MetricsReporter>),
    );

    let mut handles = Vec::new();
    for n in 0..8_i64 {
        let executor = Arc::clone(&executor);
        let schema = schema();
        handles.push(tokio::spawn(async move {
            executor
                .execute_batch(&CancellationToken::new(), &schema, row(n))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(metrics.peak() > 2, "expected parallelism, peak {}", metrics.peak());
}

#[tokio::test]
async fn test_cancellation_during_semaphore_wait() {
    let executor = Arc::new(
        ThrottledExecutor::new(OkProcessor {
            delay: Duration::from_millis(200),
        })
        .with_concurrency_limit(1),
    );

    // Occupy the only slot
    let holder = {
        let executor = Arc::clone(&executor);
        let schema = schema();
        tokio::spawn(async move {
            executor
                .execute_batch(&CancellationToken::new(), &schema, row(0))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second caller cancels while waiting for the slot
    let ctx = CancellationToken::new();
    let waiter = {
        let executor = Arc::clone(&executor);
        let schema = schema();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            executor.execute_batch(&ctx, &schema, row(1)).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    holder.await.unwrap().unwrap();
}
