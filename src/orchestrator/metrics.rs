//! Fire-and-forget metrics pipeline
//!
//! State polls emit time-series points (`tld_status`, `service_status`,
//! `emergency_usage`). Publication must never block or fail the request
//! path, so points go through [`MetricsPublisher`]: a bounded queue drained
//! by its own worker pool. On overflow the oldest batch is dropped;
//! metric gaps are preferable to request-path latency.
//!
//! [`MetricsSink`] is the export seam; [`RecorderSink`] forwards points as
//! gauges through the `metrics` facade (Prometheus export behind the
//! `prometheus` feature).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::client::types::TldServiceState;
use crate::error::Result;

/// Upstream exporters reject larger batches.
pub const MAX_BATCH_SIZE: usize = 195;

/// One time-series sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    pub fn new(name: &str, labels: BTreeMap<String, String>, value: f64) -> Self {
        Self {
            name: name.to_string(),
            labels,
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Export seam for time-series points.
///
/// `publish` receives at most [`MAX_BATCH_SIZE`] points per call.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, points: &[MetricPoint]) -> Result<()>;
}

/// [`MetricsSink`] forwarding points as gauges through the `metrics`
/// facade.
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn publish(&self, points: &[MetricPoint]) -> Result<()> {
        for point in points {
            let labels: Vec<metrics::Label> = point
                .labels
                .iter()
                .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
                .collect();
            metrics::gauge!(point.name.clone(), point.value, labels);
        }
        Ok(())
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// When the `prometheus` feature is enabled, this function sets up the
/// Prometheus metrics exporter. When disabled, it's a no-op.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
            tracing::warn!("failed to install Prometheus exporter: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Bounded, non-blocking batch queue with its own worker pool.
pub struct MetricsPublisher {
    queue: Arc<Mutex<VecDeque<Vec<MetricPoint>>>>,
    notify: Arc<Notify>,
    capacity: usize,
}

impl MetricsPublisher {
    /// Spawns `workers` drain tasks on the current tokio runtime.
    ///
    /// `capacity` bounds the number of queued batches; `workers == 0`
    /// leaves the queue undrained (only useful in tests).
    pub fn new(sink: Arc<dyn MetricsSink>, workers: usize, capacity: usize) -> Self {
        let queue: Arc<Mutex<VecDeque<Vec<MetricPoint>>>> = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let notify = Arc::clone(&notify);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                loop {
                    loop {
                        let batch = {
                            let mut queue = queue
                                .lock()
                                .unwrap_or_else(std::sync::PoisonError::into_inner);
                            queue.pop_front()
                        };
                        let Some(batch) = batch else { break };
                        for chunk in batch.chunks(MAX_BATCH_SIZE) {
                            if let Err(e) = sink.publish(chunk) {
                                tracing::warn!("metrics publication failed: {:#}", e);
                            }
                        }
                    }
                    notify.notified().await;
                }
            });
        }

        Self {
            queue,
            notify,
            capacity: capacity.max(1),
        }
    }

    /// Enqueues one batch without blocking; drops the oldest queued batch
    /// when the queue is full.
    pub fn submit(&self, points: Vec<MetricPoint>) {
        if points.is_empty() {
            return;
        }
        {
            let mut queue = self
                .queue
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if queue.len() >= self.capacity {
                queue.pop_front();
                tracing::debug!("metrics queue full; dropped oldest batch");
            }
            queue.push_back(points);
        }
        self.notify.notify_one();
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

// ---------------------------------------------------------------------------
// Status mapping and point construction
// ---------------------------------------------------------------------------

/// Maps a MoSAPI status string to its time-series value:
/// `DOWN` → 0, `UP-INCONCLUSIVE*` and `DISABLED` → 2, everything else → 1.
/// Case-insensitive.
pub fn status_metric_value(status: &str) -> i64 {
    let upper = status.to_ascii_uppercase();
    if upper == "DOWN" {
        0
    } else if upper.starts_with("UP-INCONCLUSIVE") || upper == "DISABLED" {
        2
    } else {
        1
    }
}

/// Builds the point vector published for one successfully fetched state:
/// one `tld_status` per TLD, one `service_status` and one
/// `emergency_usage` per tested service.
pub fn state_metric_points(state: &TldServiceState) -> Vec<MetricPoint> {
    let mut points = Vec::with_capacity(1 + 2 * state.tested_services.len());

    let mut tld_labels = BTreeMap::new();
    tld_labels.insert("tld".to_string(), state.tld.clone());
    points.push(MetricPoint::new(
        "tld_status",
        tld_labels,
        status_metric_value(&state.status) as f64,
    ));

    for (service, status) in &state.tested_services {
        let mut labels = BTreeMap::new();
        labels.insert("tld".to_string(), state.tld.clone());
        labels.insert("service".to_string(), service.clone());
        points.push(MetricPoint::new(
            "service_status",
            labels.clone(),
            status_metric_value(&status.status) as f64,
        ));
        points.push(MetricPoint::new(
            "emergency_usage",
            labels,
            status.emergency_threshold,
        ));
    }

    points
}
