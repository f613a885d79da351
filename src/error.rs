use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

/// Error taxonomy raised by action handlers and normalized by the engine.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Script error: {0}")]
    ScriptError(String),

    #[error("Automation stopped: {0}")]
    AutomationStopped(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Schedule parse error: {0}")]
    ScheduleParse(String),

    #[error("Semaphore acquire error: {0}")]
    SemaphoreError(String),
}

impl RuntimeError {
    /// Whether the engine's per-action retry policy should attempt this
    /// again before surfacing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::ElementNotFound(_)
                | RuntimeError::Timeout(_)
                | RuntimeError::Navigation(_)
                | RuntimeError::NetworkError(_)
                | RuntimeError::BrowserUnavailable(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RuntimeError::Validation(_) => ErrorSeverity::High,
            RuntimeError::AutomationStopped(_) => ErrorSeverity::Critical,
            RuntimeError::ElementNotFound(_) => ErrorSeverity::Low,
            RuntimeError::Config(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Medium,
        }
    }

    /// The taxonomy kind name, used by CHECK_* handlers and scheduler markers.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuntimeError::ElementNotFound(_) => "ElementNotFound",
            RuntimeError::Timeout(_) => "Timeout",
            RuntimeError::Navigation(_) => "Navigation",
            RuntimeError::Validation(_) => "Validation",
            RuntimeError::ScriptError(_) => "ScriptError",
            RuntimeError::AutomationStopped(_) => "AutomationStopped",
            RuntimeError::DownloadFailed(_) => "DownloadFailed",
            RuntimeError::NetworkError(_) => "NetworkError",
            RuntimeError::BrowserUnavailable(_) => "BrowserUnavailable",
            RuntimeError::Config(_) => "Config",
            RuntimeError::Io(_) => "Io",
            RuntimeError::Serialization(_) => "Serialization",
            RuntimeError::ScheduleParse(_) => "ScheduleParse",
            RuntimeError::SemaphoreError(_) => "SemaphoreError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Trips after repeated consecutive failures; guards the scheduler and the
/// downloader against a wedged browser driver burning wall-clock retries.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: std::sync::Arc<std::sync::Mutex<CircuitState>>,
    failure_threshold: usize,
    recovery_timeout: Duration,
    failure_count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    last_failure_time: std::sync::Arc<std::sync::Mutex<Option<std::time::Instant>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            state: std::sync::Arc::new(std::sync::Mutex::new(CircuitState::Closed)),
            failure_threshold,
            recovery_timeout,
            failure_count: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            last_failure_time: std::sync::Arc::new(std::sync::Mutex::new(None)),
        }
    }

    pub fn can_execute(&self) -> bool {
        let state = *self.state.lock().unwrap();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = *self.last_failure_time.lock().unwrap() {
                    if last_failure.elapsed() > self.recovery_timeout {
                        *self.state.lock().unwrap() = CircuitState::HalfOpen;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        self.failure_count
            .store(0, std::sync::atomic::Ordering::Relaxed);
        *self.state.lock().unwrap() = CircuitState::Closed;
        *self.last_failure_time.lock().unwrap() = None;
    }

    pub fn record_failure(&self) {
        let failures = self
            .failure_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        *self.last_failure_time.lock().unwrap() = Some(std::time::Instant::now());

        if failures >= self.failure_threshold {
            *self.state.lock().unwrap() = CircuitState::Open;
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock().unwrap()
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
            .load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl From<AcquireError> for RuntimeError {
    fn from(err: AcquireError) -> Self {
        RuntimeError::SemaphoreError(err.to_string())
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RuntimeError {
    fn from(err: serde_yaml::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for RuntimeError {
    fn from(err: chrono::ParseError) -> Self {
        RuntimeError::ScheduleParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RuntimeError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!RuntimeError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn circuit_breaker_trips_after_threshold() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(cb.can_execute());
        cb.record_failure();
        assert!(cb.can_execute());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
