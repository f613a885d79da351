use metrics::{Counter, Gauge, Histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

/// Ambient observability counters/gauges, carried regardless of the
/// feature scope in any given run — same idiom as the teacher's
/// `Metrics`, with fields renamed to the automation-runtime domain.
pub struct Metrics {
    pub actions_executed: Counter,
    pub actions_failed: Counter,
    pub action_duration: Histogram,
    pub workflow_retries: Counter,
    pub downloads_completed: Counter,
    pub duplicates_skipped: Counter,
    pub boundary_scans: Counter,
    pub scheduler_queue_size: Gauge,
    pub active_workflow: Gauge,
    pub error_count: Counter,
    pub timeout_errors: Counter,
    pub network_errors: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            actions_executed: Counter::noop(),
            actions_failed: Counter::noop(),
            action_duration: Histogram::noop(),
            workflow_retries: Counter::noop(),
            downloads_completed: Counter::noop(),
            duplicates_skipped: Counter::noop(),
            boundary_scans: Counter::noop(),
            scheduler_queue_size: Gauge::noop(),
            active_workflow: Gauge::noop(),
            error_count: Counter::noop(),
            timeout_errors: Counter::noop(),
            network_errors: Counter::noop(),
        }
    }

    pub fn record_action(&self, duration: Duration, success: bool) {
        if success {
            self.actions_executed.increment(1);
        } else {
            self.actions_failed.increment(1);
        }
        self.action_duration.record(duration.as_secs_f64());
    }

    pub fn record_download(&self) {
        self.downloads_completed.increment(1);
    }

    pub fn record_duplicate_skipped(&self) {
        self.duplicates_skipped.increment(1);
    }

    pub fn record_boundary_scan(&self) {
        self.boundary_scans.increment(1);
    }

    pub fn record_workflow_retry(&self) {
        self.workflow_retries.increment(1);
    }

    pub fn record_error(&self, error_kind: &str) {
        self.error_count.increment(1);
        match error_kind {
            "Timeout" => self.timeout_errors.increment(1),
            "NetworkError" => self.network_errors.increment(1),
            _ => {}
        }
    }

    pub fn set_scheduler_queue_size(&self, size: usize) {
        self.scheduler_queue_size.set(size as f64);
    }

    pub fn set_active_workflow(&self, running: bool) {
        self.active_workflow.set(if running { 1.0 } else { 0.0 });
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MetricsCollector {
    metrics: Arc<Metrics>,
    start_time: Instant,
    collection_interval: Duration,
}

impl MetricsCollector {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            start_time: Instant::now(),
            collection_interval: Duration::from_secs(10),
        }
    }

    pub async fn start_collection(&self) {
        let metrics = self.metrics.clone();
        let interval = self.collection_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                info!("metrics collection tick");
                let _ = &metrics;
            }
        });
    }

    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub actions_executed: u64,
    pub actions_failed: u64,
    pub average_duration: f64,
    pub downloads_completed: u64,
    pub duplicates_skipped: u64,
    pub error_count: u64,
    pub uptime: Duration,
}

pub struct PerformanceTracker {
    action_times: Arc<RwLock<Vec<Duration>>>,
    error_rates: Arc<RwLock<HashMap<String, usize>>>,
    max_samples: usize,
}

impl PerformanceTracker {
    pub fn new(_metrics: Arc<Metrics>) -> Self {
        Self {
            action_times: Arc::new(RwLock::new(Vec::new())),
            error_rates: Arc::new(RwLock::new(HashMap::new())),
            max_samples: 1000,
        }
    }

    pub async fn record_action_time(&self, duration: Duration) {
        let mut times = self.action_times.write().await;
        times.push(duration);
        if times.len() > self.max_samples {
            times.remove(0);
        }
    }

    pub async fn record_error_kind(&self, kind: String) {
        let mut rates = self.error_rates.write().await;
        *rates.entry(kind).or_insert(0) += 1;
    }

    pub async fn get_performance_stats(&self) -> PerformanceStats {
        let times = self.action_times.read().await;
        let errors = self.error_rates.read().await;

        let total_actions = times.len();
        let avg_duration = if total_actions > 0 {
            times.iter().map(|d| d.as_secs_f64()).sum::<f64>() / total_actions as f64
        } else {
            0.0
        };

        let p95_duration = if total_actions > 0 {
            let mut sorted_times = times.clone();
            sorted_times.sort();
            let p95_index = (total_actions as f64 * 0.95) as usize;
            sorted_times.get(p95_index).unwrap_or(&Duration::from_secs(0)).as_secs_f64()
        } else {
            0.0
        };

        PerformanceStats {
            total_actions,
            average_duration: avg_duration,
            p95_duration,
            error_rates: errors.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceStats {
    pub total_actions: usize,
    pub average_duration: f64,
    pub p95_duration: f64,
    pub error_rates: HashMap<String, usize>,
}

pub struct PrometheusExporter {
    port: u16,
}

impl PrometheusExporter {
    pub fn new(_metrics: Arc<Metrics>, port: u16) -> Self {
        Self { port }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        metrics::set_boxed_recorder(Box::new(recorder))?;
        info!("starting prometheus metrics server on port {}", self.port);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub max_avg_action_duration: Duration,
    pub max_error_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_avg_action_duration: Duration::from_secs(10),
            max_error_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    pub performance: HealthLevel,
    pub errors: HealthLevel,
    pub timestamp: std::time::SystemTime,
}

pub struct HealthChecker {
    tracker: Arc<PerformanceTracker>,
    thresholds: HealthThresholds,
}

impl HealthChecker {
    pub fn new(tracker: Arc<PerformanceTracker>) -> Self {
        Self {
            tracker,
            thresholds: HealthThresholds::default(),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let stats = self.tracker.get_performance_stats().await;

        let performance = if stats.average_duration > self.thresholds.max_avg_action_duration.as_secs_f64() {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        };

        let total_errors: usize = stats.error_rates.values().sum();
        let error_rate = if stats.total_actions > 0 {
            total_errors as f64 / stats.total_actions as f64
        } else {
            0.0
        };
        let errors = if error_rate > self.thresholds.max_error_rate {
            HealthLevel::Critical
        } else {
            HealthLevel::Healthy
        };

        let overall = if performance == HealthLevel::Critical || errors == HealthLevel::Critical {
            HealthLevel::Critical
        } else if performance == HealthLevel::Warning || errors == HealthLevel::Warning {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        };

        HealthStatus {
            overall,
            performance,
            errors,
            timestamp: std::time::SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_is_healthy_with_no_samples() {
        let metrics = Arc::new(Metrics::new());
        let tracker = Arc::new(PerformanceTracker::new(metrics));
        let checker = HealthChecker::new(tracker);
        let status = checker.check_health().await;
        assert_eq!(status.overall, HealthLevel::Healthy);
    }

    #[tokio::test]
    async fn high_error_rate_marks_critical() {
        let metrics = Arc::new(Metrics::new());
        let tracker = Arc::new(PerformanceTracker::new(metrics));
        tracker.record_action_time(Duration::from_millis(10)).await;
        for _ in 0..5 {
            tracker.record_error_kind("Timeout".to_string()).await;
        }
        let checker = HealthChecker::new(tracker);
        let status = checker.check_health().await;
        assert_eq!(status.errors, HealthLevel::Critical);
    }
}
