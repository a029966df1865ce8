//! The batch-insertion engine
//!
//! [`BatchFlow`] composes the [`Pipeline`](crate::pipeline::Pipeline) with a
//! [`BatchExecutor`]: submitted requests buffer until a size or time trigger,
//! the drained batch is regrouped by schema identity, and each group is
//! handed to the executor as one bulk operation.
//!
//! ```text
//! Application -> BatchFlow -> Pipeline -> ThrottledExecutor -> backend
//! ```
//!
//! Two tokens govern cancellation: the lifecycle token given at construction
//! stops the flush loop and latches the engine closed, and the per-call
//! token given to [`BatchFlow::submit`] cancels only that submission.

use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::{KvConnection, SqlConnection};
use crate::driver::{HashWriteDriver, KvDriver, MySqlDriver, PostgresDriver, SqlDriver, SqliteDriver};
use crate::error::{Error, Result};
use crate::executor::{BatchExecutor, ThrottledExecutor};
use crate::metrics::{MetricsReporter, NoopMetricsReporter, Timer};
use crate::mock::MockExecutor;
use crate::pipeline::{FlushFn, Pipeline, PipelineOptions};
use crate::processor::{KvBatchProcessor, SqlBatchProcessor};
use crate::request::Request;
use crate::retry::RetryConfig;
use crate::schema::{schema_identity, Schema};

/// Engine configuration
#[derive(Clone)]
pub struct PipelineConfig {
    /// Bounded buffer capacity; submits block when full
    pub buffer_size: usize,
    /// Count trigger for cutting a flush batch
    pub flush_size: usize,
    /// Time trigger for cutting a flush batch
    pub flush_interval: Duration,
    /// Retry policy applied by the factory-built executor
    pub retry: RetryConfig,
    /// Per-processor-call timeout applied by the factory constructors
    pub timeout: Option<Duration>,
    /// Reporter for engine, pipeline, and factory-built executor metrics
    pub metrics_reporter: Option<Arc<dyn MetricsReporter>>,
    /// Cap on concurrent executor calls; 0 means unlimited
    pub concurrency_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            flush_size: 1000,
            flush_interval: Duration::from_millis(100),
            retry: RetryConfig::default(),
            timeout: None,
            metrics_reporter: None,
            concurrency_limit: 0,
        }
    }
}

/// Batch-insertion engine
pub struct BatchFlow {
    pipeline: Pipeline<Request>,
    reporter: Arc<dyn MetricsReporter>,
    closed: Arc<AtomicBool>,
    lifecycle: CancellationToken,
}

impl BatchFlow {
    /// Compose an engine from any executor.
    ///
    /// The flush loop starts immediately and runs until `ctx` is cancelled;
    /// cancellation drains whatever is buffered through one final flush and
    /// rejects every later submit.
    pub fn new(
        ctx: &CancellationToken,
        config: PipelineConfig,
        executor: Arc<dyn BatchExecutor>,
    ) -> Self {
        let reporter = config
            .metrics_reporter
            .clone()
            .unwrap_or_else(|| Arc::new(NoopMetricsReporter));

        let flush_reporter = Arc::clone(&reporter);
        let flush_fn: FlushFn<Request> = Arc::new(move |ctx, batch| {
            let reporter = Arc::clone(&flush_reporter);
            let executor = Arc::clone(&executor);
            flush_batch(ctx, reporter, executor, batch).boxed()
        });

        let options = PipelineOptions {
            buffer_size: config.buffer_size,
            flush_size: config.flush_size,
            flush_interval: config.flush_interval,
            max_concurrent_flushes: 1,
        };
        let pipeline = Pipeline::new(ctx.clone(), options, Arc::clone(&reporter), flush_fn);

        let closed = Arc::new(AtomicBool::new(false));
        let latch = Arc::clone(&closed);
        let token = ctx.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            latch.store(true, Ordering::SeqCst);
        });

        Self {
            pipeline,
            reporter,
            closed,
            lifecycle: ctx.clone(),
        }
    }

    /// Submit one request.
    ///
    /// Validation errors return synchronously and never enter the buffer.
    /// When the buffer is full this blocks until space frees, the submit
    /// token cancels, or the engine lifecycle ends; cancellation strictly
    /// precedes a successful enqueue when both are ready.
    pub async fn submit(&self, ctx: &CancellationToken, request: Request) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.closed.load(Ordering::SeqCst) || self.lifecycle.is_cancelled() {
            return Err(Error::Cancelled);
        }

        request.validate()?;

        let timer = Timer::new();
        let permit = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            _ = self.lifecycle.cancelled() => return Err(Error::Cancelled),
            permit = self.pipeline.sender().reserve() => {
                permit.map_err(|_| Error::Cancelled)?
            }
        };
        permit.send(request);

        self.reporter.observe_enqueue_latency(timer.elapsed());
        // Approximate observation, for gauges only
        self.reporter.set_queue_length(self.pipeline.queue_len());
        Ok(())
    }

    /// Best-effort flush-error channel of the given capacity.
    ///
    /// Errors raised while the channel is full are dropped and counted;
    /// they never block the flush loop.
    pub fn error_chan(&self, size: usize) -> mpsc::Receiver<Error> {
        self.pipeline.error_chan(size)
    }

    /// Build an engine over a relational connection with a custom driver
    pub fn sql_with_driver<C: SqlConnection + 'static>(
        ctx: &CancellationToken,
        conn: C,
        config: PipelineConfig,
        driver: Arc<dyn SqlDriver>,
    ) -> Self {
        let mut processor = SqlBatchProcessor::new(conn, driver);
        if let Some(timeout) = config.timeout {
            processor = processor.with_timeout(timeout);
        }
        let executor = throttled(processor, &config);
        Self::new(ctx, config, Arc::new(executor))
    }

    /// Build an engine for MySQL / MariaDB
    pub fn mysql<C: SqlConnection + 'static>(
        ctx: &CancellationToken,
        conn: C,
        config: PipelineConfig,
    ) -> Self {
        Self::sql_with_driver(ctx, conn, config, Arc::new(MySqlDriver))
    }

    /// Build an engine for PostgreSQL
    pub fn postgres<C: SqlConnection + 'static>(
        ctx: &CancellationToken,
        conn: C,
        config: PipelineConfig,
    ) -> Self {
        Self::sql_with_driver(ctx, conn, config, Arc::new(PostgresDriver))
    }

    /// Build an engine for SQLite
    pub fn sqlite<C: SqlConnection + 'static>(
        ctx: &CancellationToken,
        conn: C,
        config: PipelineConfig,
    ) -> Self {
        Self::sql_with_driver(ctx, conn, config, Arc::new(SqliteDriver))
    }

    /// Build an engine over a key-value connection with a custom driver
    pub fn kv_with_driver<C: KvConnection + 'static>(
        ctx: &CancellationToken,
        conn: C,
        config: PipelineConfig,
        driver: Arc<dyn KvDriver>,
    ) -> Self {
        let mut processor = KvBatchProcessor::new(conn, driver);
        if let Some(timeout) = config.timeout {
            processor = processor.with_timeout(timeout);
        }
        let executor = throttled(processor, &config);
        Self::new(ctx, config, Arc::new(executor))
    }

    /// Build an engine for a key-value backend with the default hash-write
    /// driver
    pub fn kv<C: KvConnection + 'static>(
        ctx: &CancellationToken,
        conn: C,
        config: PipelineConfig,
    ) -> Self {
        Self::kv_with_driver(ctx, conn, config, Arc::new(HashWriteDriver))
    }

    /// Build an engine over a recording mock executor, for tests
    pub fn with_mock(ctx: &CancellationToken, config: PipelineConfig) -> (Self, Arc<MockExecutor>) {
        let executor = Arc::new(MockExecutor::new());
        let engine = Self::new(ctx, config, Arc::clone(&executor) as Arc<dyn BatchExecutor>);
        (engine, executor)
    }

    /// Build a mock-backed engine that also records the SQL a driver would
    /// generate for each batch, for driver tests
    pub fn with_mock_driver(
        ctx: &CancellationToken,
        config: PipelineConfig,
        driver: Arc<dyn SqlDriver>,
    ) -> (Self, Arc<MockExecutor>) {
        let executor = Arc::new(MockExecutor::with_driver(driver));
        let engine = Self::new(ctx, config, Arc::clone(&executor) as Arc<dyn BatchExecutor>);
        (engine, executor)
    }
}

fn throttled<P: crate::processor::BatchProcessor + 'static>(
    processor: P,
    config: &PipelineConfig,
) -> ThrottledExecutor<P> {
    let mut executor = ThrottledExecutor::new(processor);
    if config.retry.enabled {
        executor = executor.with_retry_config(config.retry.clone());
    }
    if let Some(reporter) = &config.metrics_reporter {
        executor = executor.with_metrics_reporter(Arc::clone(reporter));
    }
    if config.concurrency_limit > 0 {
        executor = executor.with_concurrency_limit(config.concurrency_limit);
    }
    executor
}

/// One flush: regroup by schema identity and execute each group.
///
/// The first group error aborts the remaining groups; partial failure is
/// reported as that single error through the pipeline's error channel.
async fn flush_batch(
    ctx: CancellationToken,
    reporter: Arc<dyn MetricsReporter>,
    executor: Arc<dyn BatchExecutor>,
    batch: Vec<Request>,
) -> Result<()> {
    let mut order: Vec<Arc<Schema>> = Vec::new();
    let mut groups: HashMap<usize, Vec<Request>> = HashMap::new();
    for request in batch {
        let key = schema_identity(request.schema());
        if !groups.contains_key(&key) {
            order.push(Arc::clone(request.schema()));
        }
        groups.entry(key).or_default().push(request);
    }

    for schema in order {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(requests) = groups.remove(&schema_identity(&schema)) else {
            continue;
        };

        let timer = Timer::new();
        let count = requests.len();
        let large = count > 10_000;
        let mut rows = Vec::with_capacity(count);
        for (i, request) in requests.into_iter().enumerate() {
            if large && i % 1000 == 0 && ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            rows.push(request.into_row());
        }

        reporter.observe_batch_size(count);
        reporter.observe_batch_assemble(timer.elapsed());

        executor.execute_batch(&ctx, &schema, rows).await?;
    }
    Ok(())
}
