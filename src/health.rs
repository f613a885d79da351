use crate::controller::{Controller, ControllerState};
use crate::metrics::{HealthLevel, HealthStatus, HealthThresholds, Metrics, PerformanceTracker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Periodic health evaluation for a running engine/scheduler: performance
/// from the rolling action-duration samples, errors from their recorded
/// rate, and "queue health" from however many workflows remain scheduled.
pub struct SystemHealthChecker {
    controller: Arc<Controller>,
    tracker: Arc<PerformanceTracker>,
    thresholds: HealthThresholds,
    queue_size: Arc<AtomicUsize>,
    last_check: Option<Instant>,
}

impl SystemHealthChecker {
    pub fn new(controller: Arc<Controller>, tracker: Arc<PerformanceTracker>, _metrics: Arc<Metrics>) -> Self {
        Self {
            controller,
            tracker,
            thresholds: HealthThresholds::default(),
            queue_size: Arc::new(AtomicUsize::new(0)),
            last_check: None,
        }
    }

    pub fn set_queue_size(&self, size: usize) {
        self.queue_size.store(size, Ordering::Relaxed);
    }

    pub async fn check_system_health(&mut self) -> HealthStatus {
        let start_time = Instant::now();

        let performance_health = self.check_performance_health().await;
        let error_health = self.check_error_health().await;
        let controller_health = self.check_controller_health();

        let overall = self.determine_overall_health(&[
            performance_health.clone(),
            error_health.clone(),
            controller_health,
        ]);

        let check_duration = start_time.elapsed();
        self.last_check = Some(start_time);
        info!("health check completed in {:?}: {:?}", check_duration, overall);

        HealthStatus {
            overall,
            performance: performance_health,
            errors: error_health,
            timestamp: std::time::SystemTime::now(),
        }
    }

    async fn check_performance_health(&self) -> HealthLevel {
        let stats = self.tracker.get_performance_stats().await;
        if stats.average_duration > self.thresholds.max_avg_action_duration.as_secs_f64() {
            warn!("performance health warning: average action duration {:.2}s", stats.average_duration);
            return HealthLevel::Warning;
        }
        HealthLevel::Healthy
    }

    async fn check_error_health(&self) -> HealthLevel {
        let stats = self.tracker.get_performance_stats().await;
        let total_errors: usize = stats.error_rates.values().sum();
        let error_rate = if stats.total_actions > 0 {
            total_errors as f64 / stats.total_actions as f64
        } else {
            0.0
        };

        if error_rate > self.thresholds.max_error_rate {
            error!("error health critical: error rate {:.2}%", error_rate * 100.0);
            HealthLevel::Critical
        } else if error_rate > self.thresholds.max_error_rate / 2.0 {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        }
    }

    fn check_controller_health(&self) -> HealthLevel {
        match self.controller.state() {
            ControllerState::Stopped if self.controller.is_emergency() => HealthLevel::Critical,
            _ => HealthLevel::Healthy,
        }
    }

    fn determine_overall_health(&self, healths: &[HealthLevel]) -> HealthLevel {
        if healths.contains(&HealthLevel::Critical) {
            HealthLevel::Critical
        } else if healths.contains(&HealthLevel::Warning) {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        }
    }

    pub async fn start_periodic_health_checks(&mut self, interval_duration: Duration) {
        let mut interval_timer = tokio::time::interval(interval_duration);
        loop {
            interval_timer.tick().await;
            let health_status = self.check_system_health().await;
            match health_status.overall {
                HealthLevel::Healthy => info!("system health: OK"),
                HealthLevel::Warning => warn!(
                    "system health: WARNING - performance: {:?}, errors: {:?}",
                    health_status.performance, health_status.errors
                ),
                HealthLevel::Critical => error!(
                    "system health: CRITICAL - performance: {:?}, errors: {:?}",
                    health_status.performance, health_status.errors
                ),
            }
        }
    }
}

pub struct HealthMonitor {
    checker: SystemHealthChecker,
    alerts: Vec<HealthAlert>,
}

impl HealthMonitor {
    pub fn new(controller: Arc<Controller>, tracker: Arc<PerformanceTracker>, metrics: Arc<Metrics>) -> Self {
        Self {
            checker: SystemHealthChecker::new(controller, tracker, metrics),
            alerts: Vec::new(),
        }
    }

    pub async fn start_monitoring(&mut self, interval: Duration) {
        let mut interval_timer = tokio::time::interval(interval);
        loop {
            interval_timer.tick().await;
            let health_status = self.checker.check_system_health().await;
            self.check_alerts(&health_status).await;
            self.cleanup_old_alerts();
        }
    }

    async fn check_alerts(&mut self, health_status: &HealthStatus) {
        if health_status.overall == HealthLevel::Critical {
            self.create_alert(AlertType::Critical, "system health is critical".to_string());
        }
        if health_status.errors == HealthLevel::Critical {
            self.create_alert(AlertType::ErrorRateExceeded, "error rate is critical".to_string());
        }
        if health_status.performance == HealthLevel::Critical {
            self.create_alert(
                AlertType::PerformanceDegradation,
                "performance is critically degraded".to_string(),
            );
        }
    }

    fn create_alert(&mut self, alert_type: AlertType, message: String) {
        let alert = HealthAlert {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type,
            message,
            timestamp: std::time::SystemTime::now(),
            acknowledged: false,
        };
        error!("health alert [{}]: {}", alert.alert_type, alert.message);
        self.alerts.push(alert);
    }

    fn cleanup_old_alerts(&mut self) {
        let cutoff = std::time::SystemTime::now() - Duration::from_secs(24 * 60 * 60);
        self.alerts.retain(|alert| alert.timestamp > cutoff);
    }

    pub fn get_active_alerts(&self) -> Vec<&HealthAlert> {
        self.alerts.iter().filter(|a| !a.acknowledged).collect()
    }

    pub fn acknowledge_alert(&mut self, alert_id: &str) {
        if let Some(alert) = self.alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.acknowledged = true;
            info!("alert {} acknowledged", alert_id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthAlert {
    pub id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: std::time::SystemTime,
    pub acknowledged: bool,
}

#[derive(Debug, Clone)]
pub enum AlertType {
    Critical,
    ErrorRateExceeded,
    PerformanceDegradation,
    SchedulerStalled,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Critical => write!(f, "CRITICAL"),
            AlertType::ErrorRateExceeded => write!(f, "ERROR_RATE_EXCEEDED"),
            AlertType::PerformanceDegradation => write!(f, "PERFORMANCE_DEGRADATION"),
            AlertType::SchedulerStalled => write!(f, "SCHEDULER_STALLED"),
        }
    }
}

pub struct HealthEndpoint {
    monitor: Arc<tokio::sync::Mutex<HealthMonitor>>,
}

impl HealthEndpoint {
    pub fn new(monitor: HealthMonitor) -> Self {
        Self {
            monitor: Arc::new(tokio::sync::Mutex::new(monitor)),
        }
    }

    pub async fn get_health_status(&self) -> HealthStatus {
        let mut monitor = self.monitor.lock().await;
        monitor.checker.check_system_health().await
    }

    pub async fn get_alerts(&self) -> Vec<HealthAlert> {
        let monitor = self.monitor.lock().await;
        monitor.get_active_alerts().into_iter().cloned().collect()
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) {
        let mut monitor = self.monitor.lock().await;
        monitor.acknowledge_alert(alert_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn controller_emergency_stop_marks_critical() {
        let controller = Arc::new(Controller::new());
        controller.start(1);
        controller.request_stop(true);
        controller.finish_stopping();
        let tracker = Arc::new(PerformanceTracker::new(Arc::new(Metrics::new())));
        let mut checker = SystemHealthChecker::new(controller, tracker, Arc::new(Metrics::new()));
        let status = checker.check_system_health().await;
        assert_eq!(status.overall, HealthLevel::Critical);
    }
}
