//! Prometheus metrics for the rewriter
//!
//! # Metrics
//!
//! ## Counters
//! - `kube_api_rewriter_rewrites_total{operation,action,outcome}` - Rewrites
//!   by entry point, direction and result
//!
//! ## Histograms
//! - `kube_api_rewriter_rewrite_duration_seconds{operation}` - Time spent
//!   rewriting one document
//!
//! The registry is owned by [`RewriteMetrics`] rather than the process-wide
//! default registry, so several rewriters (and tests) can coexist.

use crate::error::Result;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Histogram buckets for a single document rewrite (in seconds)
const REWRITE_DURATION_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
];

/// Entry point being measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Payload,
    Patch,
    WatchEvent,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Payload => "payload",
            Operation::Patch => "patch",
            Operation::WatchEvent => "watch_event",
        }
    }
}

/// Result of a measured rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The document changed
    Rewritten,
    /// The original bytes were returned
    Unchanged,
    /// The document was dropped by an exclude rule
    Skipped,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Rewritten => "rewritten",
            Outcome::Unchanged => "unchanged",
            Outcome::Skipped => "skipped",
            Outcome::Error => "error",
        }
    }
}

/// Rewriter metrics registry
pub struct RewriteMetrics {
    registry: Registry,
    /// Rewrites by operation, action and outcome
    pub rewrites: CounterVec,
    /// Rewrite duration by operation
    pub duration: HistogramVec,
}

impl RewriteMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let rewrites = CounterVec::new(
            Opts::new(
                "kube_api_rewriter_rewrites_total",
                "Total documents passed through the rewriter",
            ),
            &["operation", "action", "outcome"],
        )?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "kube_api_rewriter_rewrite_duration_seconds",
                "Duration of a single document rewrite in seconds",
            )
            .buckets(REWRITE_DURATION_BUCKETS.to_vec()),
            &["operation"],
        )?;

        registry.register(Box::new(rewrites.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            rewrites,
            duration,
        })
    }

    /// Record one rewrite
    pub fn observe(&self, operation: Operation, action: &str, outcome: Outcome, elapsed: Duration) {
        self.rewrites
            .with_label_values(&[operation.as_str(), action, outcome.as_str()])
            .inc();
        self.duration
            .with_label_values(&[operation.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    /// Current value of one rewrite counter
    pub fn rewrites_total(&self, operation: Operation, action: &str, outcome: Outcome) -> u64 {
        self.rewrites
            .with_label_values(&[operation.as_str(), action, outcome.as_str()])
            .get() as u64
    }

    /// Encode all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for RewriteMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteMetrics").finish_non_exhaustive()
    }
}
