//! Bounded buffering with size-or-time flush triggering
//!
//! A [`Pipeline`] owns one long-lived flush loop, started at construction and
//! terminated by the lifecycle token. Batches are cut when the buffered count
//! reaches `flush_size` or when `flush_interval` elapses, whichever comes
//! first; an empty interval tick is a no-op.
//!
//! Flush errors surface out-of-band through the best-effort channel returned
//! by [`Pipeline::error_chan`]: a full channel drops the notification and
//! bumps a `dropped` counter rather than ever blocking the loop.
//!
//! On lifecycle cancellation the loop drains whatever is already buffered
//! and runs one final flush on a detached token, so shutdown completes the
//! drain on a best-effort basis instead of aborting it mid-assembly.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::metrics::{ExecuteStatus, MetricsReporter, Timer};

/// Future returned by a flush function
pub type FlushFuture = BoxFuture<'static, crate::error::Result<()>>;

/// User-supplied flush function invoked on each drained batch
pub type FlushFn<T> = Arc<dyn Fn(CancellationToken, Vec<T>) -> FlushFuture + Send + Sync>;

/// Buffering and flush-trigger policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Bounded buffer capacity; submits block when full
    pub buffer_size: usize,
    /// Count trigger: cut a batch at this many buffered items
    pub flush_size: usize,
    /// Time trigger: cut a non-empty batch after this long
    pub flush_interval: Duration,
    /// Flushes allowed to run at once. At the default of 1, a pending
    /// trigger waits for the running flush; above 1, cross-batch ordering
    /// is forfeited.
    pub max_concurrent_flushes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            flush_size: 1000,
            flush_interval: Duration::from_millis(100),
            max_concurrent_flushes: 1,
        }
    }
}

struct Shared<T> {
    reporter: Arc<dyn MetricsReporter>,
    flush_fn: FlushFn<T>,
    error_tx: Mutex<Option<mpsc::Sender<Error>>>,
}

impl<T> Shared<T> {
    fn publish_error(&self, err: Error) {
        let guard = self.error_tx.lock();
        let Some(tx) = guard.as_ref() else {
            debug!(error = %err, "no error channel consumer, discarding flush error");
            return;
        };
        match tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                warn!(error = %err, "error channel full, dropping flush error");
                if let Some(ext) = self.reporter.as_pipeline_reporter() {
                    ext.inc_dropped("error_chan_full");
                }
            }
            Err(TrySendError::Closed(err)) => {
                debug!(error = %err, "error channel consumer gone, discarding flush error");
            }
        }
    }
}

/// Bounded queue + flush loop
pub struct Pipeline<T> {
    tx: mpsc::Sender<T>,
    shared: Arc<Shared<T>>,
    buffer_size: usize,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create the pipeline and start its flush loop.
    ///
    /// The loop runs until `ctx` is cancelled (draining and flushing what is
    /// buffered first) or until the pipeline and every cloned sender is
    /// dropped.
    pub fn new(
        ctx: CancellationToken,
        options: PipelineOptions,
        reporter: Arc<dyn MetricsReporter>,
        flush_fn: FlushFn<T>,
    ) -> Self {
        let buffer_size = options.buffer_size.max(1);
        let (tx, rx) = mpsc::channel(buffer_size);
        let shared = Arc::new(Shared {
            reporter,
            flush_fn,
            error_tx: Mutex::new(None),
        });

        tokio::spawn(flush_loop(ctx, options, Arc::clone(&shared), rx));

        Self {
            tx,
            shared,
            buffer_size,
        }
    }

    /// The bounded sender feeding the flush loop
    #[inline]
    pub fn sender(&self) -> &mpsc::Sender<T> {
        &self.tx
    }

    /// Configured buffer capacity
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Approximate buffered item count
    pub fn queue_len(&self) -> usize {
        self.buffer_size.saturating_sub(self.tx.capacity())
    }

    /// Create the best-effort error channel with the given capacity.
    ///
    /// Errors raised by flushes after this call are delivered to the
    /// returned receiver; when it is full they are dropped and counted.
    /// Calling again replaces the consumer: subsequent errors go to the new
    /// receiver only.
    pub fn error_chan(&self, size: usize) -> mpsc::Receiver<Error> {
        let (tx, rx) = mpsc::channel(size.max(1));
        *self.shared.error_tx.lock() = Some(tx);
        rx
    }
}

async fn flush_loop<T: Send + 'static>(
    ctx: CancellationToken,
    options: PipelineOptions,
    shared: Arc<Shared<T>>,
    mut rx: mpsc::Receiver<T>,
) {
    let flush_size = options.flush_size.max(1);
    let interval = if options.flush_interval.is_zero() {
        Duration::from_millis(1)
    } else {
        options.flush_interval
    };
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let parallelism = options.max_concurrent_flushes.max(1);
    let gate = (parallelism > 1).then(|| Arc::new(Semaphore::new(parallelism)));

    let mut batch: Vec<T> = Vec::with_capacity(flush_size);
    let mut batch_started: Option<Timer> = None;

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                while let Ok(item) = rx.try_recv() {
                    batch.push(item);
                }
                if !batch.is_empty() {
                    let drained = std::mem::take(&mut batch);
                    // Detached token: the shutdown drain completes best-effort
                    run_flush(&CancellationToken::new(), &shared, drained, batch_started.take()).await;
                }
                debug!("flush loop stopped: lifecycle cancelled");
                break;
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    let drained = std::mem::take(&mut batch);
                    dispatch(&ctx, &shared, &gate, drained, batch_started.take()).await;
                }
            }
            item = rx.recv() => match item {
                Some(item) => {
                    if batch.is_empty() {
                        batch_started = Some(Timer::new());
                    }
                    batch.push(item);
                    if batch.len() >= flush_size {
                        let drained = std::mem::take(&mut batch);
                        dispatch(&ctx, &shared, &gate, drained, batch_started.take()).await;
                        ticker.reset();
                    }
                }
                None => {
                    if !batch.is_empty() {
                        let drained = std::mem::take(&mut batch);
                        run_flush(&ctx, &shared, drained, batch_started.take()).await;
                    }
                    debug!("flush loop stopped: all senders dropped");
                    break;
                }
            }
        }
    }
}

async fn dispatch<T: Send + 'static>(
    ctx: &CancellationToken,
    shared: &Arc<Shared<T>>,
    gate: &Option<Arc<Semaphore>>,
    batch: Vec<T>,
    started: Option<Timer>,
) {
    match gate {
        None => run_flush(ctx, shared, batch, started).await,
        Some(gate) => {
            let Ok(permit) = Arc::clone(gate).acquire_owned().await else {
                return;
            };
            let ctx = ctx.clone();
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                run_flush(&ctx, &shared, batch, started).await;
                drop(permit);
            });
        }
    }
}

async fn run_flush<T>(
    ctx: &CancellationToken,
    shared: &Arc<Shared<T>>,
    batch: Vec<T>,
    started: Option<Timer>,
) {
    let count = batch.len();
    if let (Some(ext), Some(started)) = (shared.reporter.as_pipeline_reporter(), started) {
        ext.observe_dequeue_latency(started.elapsed());
    }

    let timer = Timer::new();
    let result = (shared.flush_fn)(ctx.clone(), batch).await;
    let status = if result.is_ok() {
        ExecuteStatus::Success
    } else {
        ExecuteStatus::Fail
    };
    if let Some(ext) = shared.reporter.as_pipeline_reporter() {
        ext.observe_process_duration(timer.elapsed(), status);
    }

    match result {
        Ok(()) => trace!(items = count, "flush completed"),
        Err(err) => {
            warn!(items = count, error = %err, "flush failed");
            shared.publish_error(err);
        }
    }
}
