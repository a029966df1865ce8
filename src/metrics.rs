//! Metrics instrumentation for batchflow
//!
//! The core consumes only the [`MetricsReporter`] trait; implementations are
//! injected at construction and called synchronously from the hot path, so
//! they must be non-blocking. [`NoopMetricsReporter`] is the default.
//! [`FacadeMetricsReporter`] forwards to the `metrics` facade crate for
//! backend-agnostic export; installing an exporter (Prometheus or otherwise)
//! is the application's job.
//!
//! # Metric Naming Convention
//!
//! Facade metrics follow the pattern `batchflow_{name}_{unit}`.

use std::time::{Duration, Instant};

/// Final status of an execute or flush operation, used as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteStatus {
    /// Operation completed
    Success,
    /// Operation returned an error
    Fail,
}

impl ExecuteStatus {
    /// Label text
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

/// Reporter interface consumed by the engine, pipeline, and executor
pub trait MetricsReporter: Send + Sync {
    /// Time spent blocking on the bounded buffer during one submit
    fn observe_enqueue_latency(&self, d: Duration);

    /// Time to assemble one schema group into row maps
    fn observe_batch_assemble(&self, d: Duration);

    /// Size of one schema group handed to the executor
    fn observe_batch_size(&self, n: usize);

    /// One observation per `execute_batch`, spanning every attempt and
    /// backoff sleep, labelled with the final status
    fn observe_execute_duration(&self, table: &str, rows: usize, d: Duration, status: ExecuteStatus);

    /// Current number of executions past admission control
    fn set_concurrency(&self, n: usize);

    /// Approximate buffer occupancy after an enqueue
    fn set_queue_length(&self, n: usize);

    /// An execution entered flight
    fn inc_inflight(&self);

    /// An execution left flight
    fn dec_inflight(&self);

    /// An error event; `kind` is `retry:<reason>` or `final:<reason>`
    fn inc_error(&self, table: &str, kind: &str);

    /// Probe for the optional extended surface. Implementations that also
    /// implement [`PipelineMetricsReporter`] override this to return `Some`.
    fn as_pipeline_reporter(&self) -> Option<&dyn PipelineMetricsReporter> {
        None
    }
}

/// Optional extended reporter surface for pipeline-level events
pub trait PipelineMetricsReporter: MetricsReporter {
    /// Buffer residency of a batch, from first buffered item to dispatch
    fn observe_dequeue_latency(&self, d: Duration);

    /// Wall time of one flush invocation, labelled with its status
    fn observe_process_duration(&self, d: Duration, status: ExecuteStatus);

    /// A best-effort notification was dropped; `reason` names the drop site
    fn inc_dropped(&self, reason: &str);
}

/// Reporter that discards every observation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsReporter;

impl MetricsReporter for NoopMetricsReporter {
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
    fn inc_inflight(&self) {}
    fn dec_inflight(&self) {}
    fn inc_error(&self, _table: &str, _kind: &str) {}
}

/// Reporter backed by the `metrics` facade crate
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetricsReporter;

impl MetricsReporter for FacadeMetricsReporter {
    fn observe_enqueue_latency(&self, d: Duration) {
        metrics::histogram!("batchflow_enqueue_latency_seconds").record(d.as_secs_f64());
    }

    fn observe_batch_assemble(&self, d: Duration) {
        metrics::histogram!("batchflow_batch_assemble_seconds").record(d.as_secs_f64());
    }

    fn observe_batch_size(&self, n: usize) {
        metrics::histogram!("batchflow_batch_size").record(n as f64);
    }

    fn observe_execute_duration(&self, table: &str, rows: usize, d: Duration, status: ExecuteStatus) {
        metrics::histogram!(
            "batchflow_execute_duration_seconds",
            "table" => table.to_string(),
            "status" => status.as_str()
        )
        .record(d.as_secs_f64());
        metrics::counter!(
            "batchflow_rows_executed_total",
            "table" => table.to_string(),
            "status" => status.as_str()
        )
        .increment(rows as u64);
    }

    fn set_concurrency(&self, n: usize) {
        metrics::gauge!("batchflow_concurrency").set(n as f64);
    }

    fn set_queue_length(&self, n: usize) {
        metrics::gauge!("batchflow_queue_length").set(n as f64);
    }

    fn inc_inflight(&self) {
        metrics::gauge!("batchflow_inflight").increment(1.0);
    }

    fn dec_inflight(&self) {
        metrics::gauge!("batchflow_inflight").decrement(1.0);
    }

    fn inc_error(&self, table: &str, kind: &str) {
        metrics::counter!(
            "batchflow_errors_total",
            "table" => table.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    fn as_pipeline_reporter(&self) -> Option<&dyn PipelineMetricsReporter> {
        Some(self)
    }
}

impl PipelineMetricsReporter for FacadeMetricsReporter {
    fn observe_dequeue_latency(&self, d: Duration) {
        metrics::histogram!("batchflow_dequeue_latency_seconds").record(d.as_secs_f64());
    }

    fn observe_process_duration(&self, d: Duration, status: ExecuteStatus) {
        metrics::histogram!(
            "batchflow_process_duration_seconds",
            "status" => status.as_str()
        )
        .record(d.as_secs_f64());
    }

    fn inc_dropped(&self, reason: &str) {
        metrics::counter!(
            "batchflow_dropped_total",
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}

/// Timer for measuring operation durations
pub(crate) struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new timer starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed Duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
