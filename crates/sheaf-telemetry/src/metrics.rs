//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Labels follow the destination state machine (`step`, `status`, `outcome`).

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared by destination engines.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    dest_steps_total: IntCounterVec,
    dest_descriptors_total: IntCounterVec,
    dest_bytes_written_total: IntCounter,
    dest_chmod_total: IntCounter,
}

/// Snapshot of selected counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Descriptors emitted downstream after a successful pipeline.
    pub descriptors_emitted: u64,
    /// Descriptors that terminated in an error.
    pub descriptors_failed: u64,
    /// Total bytes written to destination files.
    pub bytes_written_total: u64,
    /// Permission changes issued against the filesystem.
    pub chmod_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let dest_steps_total = IntCounterVec::new(
            Opts::new(
                "dest_steps_total",
                "Destination pipeline steps executed by status",
            ),
            &["step", "status"],
        )?;
        let dest_descriptors_total = IntCounterVec::new(
            Opts::new(
                "dest_descriptors_total",
                "Descriptors processed by destination engines by outcome",
            ),
            &["outcome"],
        )?;
        let dest_bytes_written_total = IntCounter::with_opts(Opts::new(
            "dest_bytes_written_total",
            "Bytes written to destination files",
        ))?;
        let dest_chmod_total = IntCounter::with_opts(Opts::new(
            "dest_chmod_total",
            "Permission changes issued by mode reconciliation",
        ))?;

        registry.register(Box::new(dest_steps_total.clone()))?;
        registry.register(Box::new(dest_descriptors_total.clone()))?;
        registry.register(Box::new(dest_bytes_written_total.clone()))?;
        registry.register(Box::new(dest_chmod_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                dest_steps_total,
                dest_descriptors_total,
                dest_bytes_written_total,
                dest_chmod_total,
            }),
        })
    }

    /// Increment the destination step counter.
    pub fn inc_dest_step(&self, step: &str, status: &str) {
        self.inner
            .dest_steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Increment the per-descriptor outcome counter (`emitted` or `failed`).
    pub fn inc_descriptor(&self, outcome: &str) {
        self.inner
            .dest_descriptors_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record bytes written to a destination file.
    pub fn add_bytes_written(&self, bytes: u64) {
        self.inner.dest_bytes_written_total.inc_by(bytes);
    }

    /// Increment the permission change counter.
    pub fn inc_chmod(&self) {
        self.inner.dest_chmod_total.inc();
    }

    /// Current value of the step counter for the given labels.
    #[must_use]
    pub fn step_count(&self, step: &str, status: &str) -> u64 {
        self.inner
            .dest_steps_total
            .with_label_values(&[step, status])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the destination counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            descriptors_emitted: self
                .inner
                .dest_descriptors_total
                .with_label_values(&["emitted"])
                .get(),
            descriptors_failed: self
                .inner
                .dest_descriptors_total
                .with_label_values(&["failed"])
                .get(),
            bytes_written_total: self.inner.dest_bytes_written_total.get(),
            chmod_total: self.inner.dest_chmod_total.get(),
        }
    }
}
