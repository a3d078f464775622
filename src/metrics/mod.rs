//! Metrics collection and reporting
//!
//! The engine never reads metrics back: it reports through [`ChatMetrics`],
//! which forwards to a pluggable [`MetricsCollector`] backend. The collector
//! is constructed by the caller and injected, there is no global registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{ChatroomError, Result};

/// Label set attached to a metric; ordered so export is stable
pub type Labels = BTreeMap<String, String>;

/// Latency buckets in seconds
const LATENCY_BUCKETS: [f64; 8] = [0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Metric value types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    /// `counts[i]` is the number of observations `<= bounds[i]`
    Histogram { bounds: Vec<f64>, counts: Vec<u64>, count: u64, sum: f64 },
}

/// A single metric data point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
}

/// Metric collection interface
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    async fn increment_counter_by(&self, name: &str, value: u64, labels: Labels) -> Result<()>;

    async fn set_gauge(&self, name: &str, value: f64, labels: Labels) -> Result<()>;

    /// Move a gauge by `delta`, creating it at zero
    async fn add_gauge(&self, name: &str, delta: f64, labels: Labels) -> Result<()>;

    async fn record_histogram(&self, name: &str, value: f64, labels: Labels) -> Result<()>;

    async fn get_metrics(&self) -> Result<Vec<Metric>>;

    /// Render every metric as `prometheus` text or `json`
    async fn export_metrics(&self, format: &str) -> Result<String>;

    async fn reset(&self) -> Result<()>;
}

/// In-memory metrics collector
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn metric_key(name: &str, labels: &Labels) -> String {
        let mut key = name.to_string();
        for (k, v) in labels {
            key.push_str(&format!(",{}={}", k, v));
        }
        key
    }

    fn render_labels(labels: &Labels) -> String {
        if labels.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}=\"{}\"", k, v)).collect();
        format!("{{{}}}", pairs.join(","))
    }
}

#[async_trait]
impl MetricsCollector for InMemoryMetricsCollector {
    async fn increment_counter_by(&self, name: &str, value: u64, labels: Labels) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        let mut metrics = self.metrics.write().await;

        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            value: MetricValue::Counter(0),
            labels,
            timestamp: Utc::now(),
        });

        if let MetricValue::Counter(ref mut count) = metric.value {
            *count += value;
            metric.timestamp = Utc::now();
        }
        Ok(())
    }

    async fn set_gauge(&self, name: &str, value: f64, labels: Labels) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        self.metrics.write().await.insert(
            key,
            Metric { name: name.to_string(), value: MetricValue::Gauge(value), labels, timestamp: Utc::now() },
        );
        Ok(())
    }

    async fn add_gauge(&self, name: &str, delta: f64, labels: Labels) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        let mut metrics = self.metrics.write().await;

        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            value: MetricValue::Gauge(0.0),
            labels,
            timestamp: Utc::now(),
        });

        if let MetricValue::Gauge(ref mut current) = metric.value {
            *current += delta;
            metric.timestamp = Utc::now();
        }
        Ok(())
    }

    async fn record_histogram(&self, name: &str, value: f64, labels: Labels) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        let mut metrics = self.metrics.write().await;

        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            value: MetricValue::Histogram {
                bounds: LATENCY_BUCKETS.to_vec(),
                counts: vec![0; LATENCY_BUCKETS.len()],
                count: 0,
                sum: 0.0,
            },
            labels,
            timestamp: Utc::now(),
        });

        if let MetricValue::Histogram { bounds, counts, count, sum } = &mut metric.value {
            for (bound, bucket) in bounds.iter().zip(counts.iter_mut()) {
                if value <= *bound {
                    *bucket += 1;
                }
            }
            *count += 1;
            *sum += value;
            metric.timestamp = Utc::now();
        }
        Ok(())
    }

    async fn get_metrics(&self) -> Result<Vec<Metric>> {
        let metrics = self.metrics.read().await;
        let mut all: Vec<Metric> = metrics.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        Ok(all)
    }

    async fn export_metrics(&self, format: &str) -> Result<String> {
        let metrics = self.get_metrics().await?;

        match format {
            "json" => Ok(serde_json::to_string_pretty(&metrics)?),
            "prometheus" => {
                let mut output = String::new();
                let mut last_name = "";

                for metric in &metrics {
                    if metric.name != last_name {
                        let kind = match metric.value {
                            MetricValue::Counter(_) => "counter",
                            MetricValue::Gauge(_) => "gauge",
                            MetricValue::Histogram { .. } => "histogram",
                        };
                        output.push_str(&format!("# TYPE {} {}\n", metric.name, kind));
                        last_name = &metric.name;
                    }

                    let labels = Self::render_labels(&metric.labels);
                    match &metric.value {
                        MetricValue::Counter(value) => {
                            output.push_str(&format!("{}{} {}\n", metric.name, labels, value));
                        }
                        MetricValue::Gauge(value) => {
                            output.push_str(&format!("{}{} {}\n", metric.name, labels, value));
                        }
                        MetricValue::Histogram { bounds, counts, count, sum } => {
                            for (bound, bucket) in bounds.iter().zip(counts) {
                                let mut with_le = metric.labels.clone();
                                with_le.insert("le".to_string(), bound.to_string());
                                output.push_str(&format!(
                                    "{}_bucket{} {}\n",
                                    metric.name,
                                    Self::render_labels(&with_le),
                                    bucket
                                ));
                            }
                            let mut with_inf = metric.labels.clone();
                            with_inf.insert("le".to_string(), "+Inf".to_string());
                            output.push_str(&format!(
                                "{}_bucket{} {}\n",
                                metric.name,
                                Self::render_labels(&with_inf),
                                count
                            ));
                            output.push_str(&format!("{}_count{} {}\n", metric.name, labels, count));
                            output.push_str(&format!("{}_sum{} {}\n", metric.name, labels, sum));
                        }
                    }
                }

                Ok(output)
            }
            _ => Err(ChatroomError::SystemError(format!("Unsupported export format: {}", format))),
        }
    }

    async fn reset(&self) -> Result<()> {
        self.metrics.write().await.clear();
        Ok(())
    }
}

/// Metric names reported by the room engine
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "chat_connections_total";
    pub const DISCONNECTIONS_TOTAL: &str = "chat_disconnections_total";
    pub const ACTIVE_CONNECTIONS: &str = "chat_active_connections";
    pub const MESSAGES_RECEIVED: &str = "chat_messages_received_total";
    pub const MESSAGES_SENT: &str = "chat_messages_sent_total";
    pub const MESSAGES_FAILED: &str = "chat_messages_failed_total";
    pub const ROOMS_CREATED: &str = "chat_rooms_created_total";
    pub const ROOMS_DESTROYED: &str = "chat_rooms_destroyed_total";
    pub const ACTIVE_ROOMS: &str = "chat_active_rooms";
    pub const RATE_LIMITED: &str = "chat_rate_limited_total";
    pub const PROCESSING_SECONDS: &str = "chat_message_processing_seconds";
}

/// Domain facade over a collector. Recording never fails the caller;
/// backend errors are only logged.
#[derive(Clone)]
pub struct ChatMetrics {
    collector: Arc<dyn MetricsCollector>,
}

impl ChatMetrics {
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self { collector }
    }

    /// Facade over a fresh in-memory collector
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryMetricsCollector::new()))
    }

    pub fn collector(&self) -> Arc<dyn MetricsCollector> {
        self.collector.clone()
    }

    async fn count(&self, name: &str, labels: Labels) {
        if let Err(e) = self.collector.increment_counter_by(name, 1, labels).await {
            debug!("Failed to record {}: {}", name, e);
        }
    }

    async fn shift(&self, name: &str, delta: f64) {
        if let Err(e) = self.collector.add_gauge(name, delta, Labels::new()).await {
            debug!("Failed to update {}: {}", name, e);
        }
    }

    fn kind_label(kind: &str) -> Labels {
        let mut labels = Labels::new();
        labels.insert("type".to_string(), kind.to_string());
        labels
    }

    pub async fn connection_opened(&self) {
        self.count(names::CONNECTIONS_TOTAL, Labels::new()).await;
        self.shift(names::ACTIVE_CONNECTIONS, 1.0).await;
    }

    pub async fn connection_closed(&self) {
        self.count(names::DISCONNECTIONS_TOTAL, Labels::new()).await;
        self.shift(names::ACTIVE_CONNECTIONS, -1.0).await;
    }

    pub async fn message_received(&self) {
        self.count(names::MESSAGES_RECEIVED, Labels::new()).await;
    }

    pub async fn message_sent(&self, kind: &str) {
        self.count(names::MESSAGES_SENT, Self::kind_label(kind)).await;
    }

    pub async fn message_failed(&self, kind: &str) {
        self.count(names::MESSAGES_FAILED, Self::kind_label(kind)).await;
    }

    pub async fn room_created(&self) {
        self.count(names::ROOMS_CREATED, Labels::new()).await;
        self.shift(names::ACTIVE_ROOMS, 1.0).await;
    }

    pub async fn room_destroyed(&self) {
        self.count(names::ROOMS_DESTROYED, Labels::new()).await;
        self.shift(names::ACTIVE_ROOMS, -1.0).await;
    }

    pub async fn rate_limited(&self) {
        self.count(names::RATE_LIMITED, Labels::new()).await;
    }

    pub async fn observe_latency(&self, kind: &str, elapsed: Duration) {
        let result = self
            .collector
            .record_histogram(names::PROCESSING_SECONDS, elapsed.as_secs_f64(), Self::kind_label(kind))
            .await;
        if let Err(e) = result {
            debug!("Failed to record latency: {}", e);
        }
    }

    /// Summed value of a counter or gauge across all label sets
    pub async fn total(&self, name: &str) -> f64 {
        let metrics = match self.collector.get_metrics().await {
            Ok(metrics) => metrics,
            Err(_) => return 0.0,
        };
        metrics
            .iter()
            .filter(|m| m.name == name)
            .map(|m| match &m.value {
                MetricValue::Counter(count) => *count as f64,
                MetricValue::Gauge(value) => *value,
                MetricValue::Histogram { count, .. } => *count as f64,
            })
            .sum()
    }

    pub async fn export(&self, format: &str) -> Result<String> {
        self.collector.export_metrics(format).await
    }
}

impl Default for ChatMetrics {
    fn default() -> Self {
        Self::in_memory()
    }
}
