//! Batch executors: concurrency limiting, retries, metric emission
//!
//! [`ThrottledExecutor`] wraps a [`BatchProcessor`] with an optional counting
//! semaphore, a classified retry loop with exponential backoff, in-flight
//! accounting, and one duration observation per batch spanning every attempt
//! and backoff sleep.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::metrics::{ExecuteStatus, MetricsReporter, NoopMetricsReporter, Timer};
use crate::processor::BatchProcessor;
use crate::retry::{backoff_delay, default_retry_classifier, Classification, RetryConfig};
use crate::schema::Schema;
use crate::types::RowData;

/// Pluggable retry classifier
pub type RetryClassifier = Arc<dyn Fn(&Error) -> Classification + Send + Sync>;

/// Executes one (schema, rows) batch
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    /// Execute the batch, returning a classified error on final failure
    async fn execute_batch(
        &self,
        ctx: &CancellationToken,
        schema: &Arc<Schema>,
        rows: Vec<RowData>,
    ) -> Result<()>;
}

/// Executor with admission control and a classified retry loop
pub struct ThrottledExecutor<P> {
    processor: P,
    retry: RetryConfig,
    classifier: RetryClassifier,
    reporter: Arc<dyn MetricsReporter>,
    semaphore: Option<Arc<Semaphore>>,
    inflight: AtomicI64,
}

impl<P: BatchProcessor> ThrottledExecutor<P> {
    /// Wrap a processor with default (disabled) retry and no throttling
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            retry: RetryConfig::default(),
            classifier: Arc::new(default_retry_classifier),
            reporter: Arc::new(NoopMetricsReporter),
            semaphore: None,
            inflight: AtomicI64::new(0),
        }
    }

    /// Enable the retry loop
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the default classifier with a backend-aware one
    pub fn with_retry_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Error) -> Classification + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Inject a metrics reporter
    pub fn with_metrics_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Cap concurrent `execute_batch` calls; `limit == 0` means unlimited
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// The configured reporter
    pub fn metrics_reporter(&self) -> Arc<dyn MetricsReporter> {
        Arc::clone(&self.reporter)
    }

    async fn run_attempts(
        &self,
        ctx: &CancellationToken,
        schema: &Schema,
        rows: &[RowData],
    ) -> Result<()> {
        let max_attempts = if self.retry.enabled {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let outcome = async {
                let operations = self.processor.generate_operations(ctx, schema, rows).await?;
                self.processor.execute_operations(ctx, operations).await
            }
            .await;

            let err = match outcome {
                Ok(()) => {
                    debug!(table = schema.name(), rows = rows.len(), attempt, "batch executed");
                    return Ok(());
                }
                Err(err) => err,
            };

            let verdict = (self.classifier)(&err);
            if !verdict.retryable || attempt >= max_attempts {
                self.reporter
                    .inc_error(schema.name(), &format!("final:{}", verdict.reason));
                return Err(err);
            }

            self.reporter
                .inc_error(schema.name(), &format!("retry:{}", verdict.reason));
            let delay = backoff_delay(attempt, self.retry.backoff_base, self.retry.max_backoff);
            warn!(
                table = schema.name(),
                attempt,
                reason = %verdict.reason,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retryable batch failure, backing off"
            );

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[async_trait]
impl<P: BatchProcessor> BatchExecutor for ThrottledExecutor<P> {
    async fn execute_batch(
        &self,
        ctx: &CancellationToken,
        schema: &Arc<Schema>,
        rows: Vec<RowData>,
    ) -> Result<()> {
        let _permit = match &self.semaphore {
            Some(semaphore) => {
                let acquired = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(Error::Cancelled),
                    permit = Arc::clone(semaphore).acquire_owned() => permit,
                };
                match acquired {
                    Ok(permit) => Some(permit),
                    Err(_) => return Err(Error::Cancelled),
                }
            }
            None => None,
        };

        let entered = self.inflight.fetch_add(1, Ordering::AcqRel) + 1;
        self.reporter.inc_inflight();
        self.reporter.set_concurrency(entered.max(0) as usize);

        let timer = Timer::new();
        let result = self.run_attempts(ctx, schema, &rows).await;
        let status = if result.is_ok() {
            ExecuteStatus::Success
        } else {
            ExecuteStatus::Fail
        };
        self.reporter
            .observe_execute_duration(schema.name(), rows.len(), timer.elapsed(), status);

        let remaining = self.inflight.fetch_sub(1, Ordering::AcqRel) - 1;
        self.reporter.dec_inflight();
        self.reporter.set_concurrency(remaining.max(0) as usize);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Operations;
    use crate::retry::RetryReason;
    use crate::schema::ConflictPolicy;
    use crate::types::Value;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct ScriptedProcessor {
        attempts: AtomicU32,
        succeed_after: u32,
        error: fn() -> Error,
    }

    impl ScriptedProcessor {
        fn failing_until(succeed_after: u32, error: fn() -> Error) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                succeed_after,
                error,
            }
        }
    }

    #[async_trait]
    impl BatchProcessor for ScriptedProcessor {
        async fn generate_operations(
            &self,
            _ctx: &CancellationToken,
            _schema: &Schema,
            _rows: &[RowData],
        ) -> crate::error::Result<Operations> {
            Ok(Operations::Statement {
                sql: "x".into(),
                args: Vec::new(),
            })
        }

        async fn execute_operations(
            &self,
            _ctx: &CancellationToken,
            _operations: Operations,
        ) -> crate::error::Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.succeed_after {
                Ok(())
            } else {
                Err((self.error)())
            }
        }
    }

    #[derive(Default)]
    struct CountingReporter {
        retries: AtomicI64,
        finals: AtomicI64,
        inflight: AtomicI64,
        kinds: Mutex<Vec<String>>,
    }

    impl MetricsReporter for CountingReporter {
        fn observe_enqueue_latency(&self, _d: Duration) {}
        fn observe_batch_assemble(&self, _d: Duration) {}
        fn observe_batch_size(&self, _n: usize) {}
        fn observe_execute_duration(
            &self,
            _table: &str,
            _rows: usize,
            _d: Duration,
            _status: ExecuteStatus,
        ) {
        }
        fn set_concurrency(&self, _n: usize) {}
        fn set_queue_length(&self, _n: usize) {}
        fn inc_inflight(&self) {
            self.inflight.fetch_add(1, Ordering::SeqCst);
        }
        fn dec_inflight(&self) {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
        }
        fn inc_error(&self, _table: &str, kind: &str) {
            if kind.starts_with("retry:") {
                self.retries.fetch_add(1, Ordering::SeqCst);
            } else if kind.starts_with("final:") {
                self.finals.fetch_add(1, Ordering::SeqCst);
            }
            self.kinds.lock().push(kind.to_owned());
        }
    }

    fn schema() -> Arc<Schema> {
        Schema::relational("users", ConflictPolicy::Ignore, ["id"])
    }

    fn rows() -> Vec<RowData> {
        vec![RowData::from([("id".to_string(), Value::Int64(1))])]
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts,
            backoff_base: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let executor = ThrottledExecutor::new(ScriptedProcessor::failing_until(2, || {
            Error::execution("timeout: i/o timeout")
        }))
        .with_retry_config(fast_retry(3));

        let ctx = CancellationToken::new();
        executor
            .execute_batch(&ctx, &schema(), rows())
            .await
            .expect("success after retries");
        assert_eq!(executor.processor.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_final_failure_counts_exact() {
        let reporter = Arc::new(CountingReporter::default());
        let executor = ThrottledExecutor::new(ScriptedProcessor::failing_until(u32::MAX, || {
            Error::execution("timeout: temporary network failure")
        }))
        .with_retry_config(fast_retry(4))
        .with_metrics_reporter(Arc::clone(&reporter) as Arc<dyn MetricsReporter>);

        let err = executor
            .execute_batch(&CancellationToken::new(), &schema(), rows())
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());

        // M attempts, M-1 retry increments, one final increment
        assert_eq!(executor.processor.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(reporter.retries.load(Ordering::SeqCst), 3);
        assert_eq!(reporter.finals.load(Ordering::SeqCst), 1);
        assert_eq!(reporter.inflight.load(Ordering::SeqCst), 0);
        assert!(reporter
            .kinds
            .lock()
            .iter()
            .all(|k| k.ends_with("timeout")));
    }

    #[tokio::test]
    async fn test_retry_disabled_single_attempt() {
        let reporter = Arc::new(CountingReporter::default());
        let executor = ThrottledExecutor::new(ScriptedProcessor::failing_until(u32::MAX, || {
            Error::execution("deadlock detected")
        }))
        .with_metrics_reporter(Arc::clone(&reporter) as Arc<dyn MetricsReporter>);

        let _ = executor
            .execute_batch(&CancellationToken::new(), &schema(), rows())
            .await;
        assert_eq!(executor.processor.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(reporter.retries.load(Ordering::SeqCst), 0);
        assert_eq!(reporter.finals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let executor = ThrottledExecutor::new(ScriptedProcessor::failing_until(u32::MAX, || {
            Error::execution("syntax error")
        }))
        .with_retry_config(fast_retry(5));

        let _ = executor
            .execute_batch(&CancellationToken::new(), &schema(), rows())
            .await;
        assert_eq!(executor.processor.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_classifier_override() {
        // Treat everything as terminal
        let executor = ThrottledExecutor::new(ScriptedProcessor::failing_until(u32::MAX, || {
            Error::execution("timeout")
        }))
        .with_retry_config(fast_retry(5))
        .with_retry_classifier(|_| Classification::terminal(RetryReason::NonRetryable));

        let _ = executor
            .execute_batch(&CancellationToken::new(), &schema(), rows())
            .await;
        assert_eq!(executor.processor.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_rejected_at_semaphore() {
        let executor = ThrottledExecutor::new(ScriptedProcessor::failing_until(0, || {
            Error::execution("unused")
        }))
        .with_concurrency_limit(1);

        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = executor
            .execute_batch(&ctx, &schema(), rows())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(executor.processor.attempts.load(Ordering::SeqCst), 0);
    }
}
