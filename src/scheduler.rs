//! Scheduler (C10): sequential multi-workflow runner with retry, scheduled
//! start gating, and heuristic failure classification from a completed
//! workflow's exit status and captured output.

use crate::config::SchedulerConfig;
use crate::controller::Controller;
use crate::error::RuntimeError;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Failure markers, checked regardless of exit code (§4.9 rule 1: these
/// override a zero exit status).
const FAILURE_MARKERS: &[&str] = &[
    "stop_automation",
    "Automation stopped",
    "RuntimeError",
    "queue is full",
];

/// Markers that confirm a zero-exit run actually completed (§4.9 rule 2).
/// A zero exit with neither marker present is "completed with issues"
/// (rule 3) and classifies as a failure.
const SUCCESS_MARKERS: &[&str] = &["success", "completed"];

/// Three-rule classification from §4.9: rule 1 (failure markers override
/// everything, including a zero exit code) is checked first; rule 2 (zero
/// exit plus a success marker) returns success; rule 3 (zero exit with no
/// recognized marker, or a non-zero exit) returns failure.
pub fn classify_failure(exit_success: bool, combined_output: &str) -> Option<String> {
    for marker in FAILURE_MARKERS {
        if combined_output.contains(marker) {
            return Some(marker.to_string());
        }
    }
    if exit_success {
        if SUCCESS_MARKERS.iter().any(|m| combined_output.contains(m)) {
            return None;
        }
        return Some("completed with issues".to_string());
    }
    Some("non-zero exit".to_string())
}

#[derive(Debug, Clone)]
pub struct WorkflowRunOutcome {
    pub config: PathBuf,
    pub attempts: u32,
    pub succeeded: bool,
    pub last_failure: Option<String>,
}

/// Resolves the scheduled start instant. Missing date defaults to today;
/// missing time defaults to midnight. A start time already in the past
/// triggers an immediate run with a logged warning rather than an error.
pub fn resolve_start(config: &SchedulerConfig, now: NaiveDateTime) -> Duration {
    let date = config
        .scheduled_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .unwrap_or_else(|| now.date());
    let time = config
        .scheduled_time
        .as_deref()
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").or_else(|_| NaiveTime::parse_from_str(t, "%H:%M")).ok())
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());

    let target = date.and_time(time);
    if target <= now {
        warn!("scheduled start {} is in the past; starting immediately", target);
        return Duration::ZERO;
    }
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Runs a single workflow config as a subprocess of this same binary and
/// classifies the result. Subprocess isolation keeps one wedged workflow's
/// browser state from bleeding into the next.
pub async fn run_one(exe: &Path, config_path: &Path) -> Result<(bool, String), RuntimeError> {
    let output = tokio::process::Command::new(exe)
        .arg("workflow")
        .arg("run")
        .arg("--config")
        .arg(config_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok((output.status.success(), combined))
}

pub struct Scheduler {
    config: SchedulerConfig,
    controller: Arc<Controller>,
    exe_path: PathBuf,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, controller: Arc<Controller>, exe_path: PathBuf) -> Self {
        Self {
            config,
            controller,
            exe_path,
        }
    }

    /// Sleeps until the scheduled start, then runs every configured
    /// workflow in sequence, retrying each failure up to `max_retries`
    /// times, honoring pause/resume/stop on the controller between
    /// attempts and between workflows. A workflow that exhausts its
    /// retries does not abort the schedule — the next config still runs.
    pub async fn run(&self) -> Result<Vec<WorkflowRunOutcome>, RuntimeError> {
        let now = Local::now().naive_local();
        let wait = resolve_start(&self.config, now);
        if !wait.is_zero() {
            info!("scheduler sleeping {:?} until scheduled start", wait);
            tokio::time::sleep(wait).await;
        }

        let mut results = Vec::new();

        for config_path in &self.config.configs {
            self.controller.await_resume().await;
            if self.controller.check_should_stop() {
                info!("scheduler observed stop request before running {:?}", config_path);
                break;
            }

            let outcome = self.run_with_retries(config_path).await?;
            results.push(outcome);
        }

        Ok(results)
    }

    async fn run_with_retries(&self, config_path: &Path) -> Result<WorkflowRunOutcome, RuntimeError> {
        let mut attempts = 0u32;
        loop {
            self.controller.await_resume().await;
            if self.controller.check_should_stop() {
                return Ok(WorkflowRunOutcome {
                    config: config_path.to_path_buf(),
                    attempts,
                    succeeded: false,
                    last_failure: None,
                });
            }

            attempts += 1;
            let (success, output) = run_one(&self.exe_path, config_path).await?;
            let classification = classify_failure(success, &output);

            match classification {
                None => {
                    info!("workflow {:?} succeeded on attempt {}", config_path, attempts);
                    tokio::time::sleep(Duration::from_secs(self.config.success_wait_secs)).await;
                    return Ok(WorkflowRunOutcome {
                        config: config_path.to_path_buf(),
                        attempts,
                        succeeded: true,
                        last_failure: None,
                    });
                }
                Some(ref reason) => {
                    if attempts >= self.config.max_retries {
                        warn!(
                            "workflow {:?} exhausted {} retries, last failure: {reason}",
                            config_path, self.config.max_retries
                        );
                        return Ok(WorkflowRunOutcome {
                            config: config_path.to_path_buf(),
                            attempts,
                            succeeded: false,
                            last_failure: classification,
                        });
                    }
                    warn!(
                        "workflow {:?} failed ({reason}), retrying ({}/{})",
                        config_path, attempts, self.config.max_retries
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.failure_wait_secs)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_classifies_timeout_as_failure_on_nonzero_exit() {
        let result = classify_failure(false, "RuntimeError: Timeout after 3s\nexiting");
        assert_eq!(result, Some("RuntimeError".to_string()));
    }

    #[test]
    fn fatal_marker_overrides_zero_exit_status() {
        let combined = "Automation stopped: user requested halt";
        let result = classify_failure(true, combined);
        assert_eq!(result, Some("Automation stopped".to_string()));
    }

    #[test]
    fn zero_exit_with_success_marker_is_success() {
        assert_eq!(classify_failure(true, "workflow completed successfully"), None);
    }

    #[test]
    fn zero_exit_without_marker_is_failure() {
        let result = classify_failure(true, "nothing recognizable here");
        assert_eq!(result, Some("completed with issues".to_string()));
    }

    #[test]
    fn nonzero_exit_without_marker_defaults_to_failure() {
        let result = classify_failure(false, "segmentation fault (core dumped)");
        assert_eq!(result, Some("non-zero exit".to_string()));
    }

    #[test]
    fn missing_date_and_time_default_to_today_midnight_and_run_immediately() {
        let config = SchedulerConfig {
            configs: vec![],
            scheduled_time: None,
            scheduled_date: None,
            success_wait_secs: 1,
            failure_wait_secs: 1,
            max_retries: 1,
        };
        let now = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(resolve_start(&config, now), Duration::ZERO);
    }

    #[test]
    fn future_scheduled_time_computes_positive_wait() {
        let config = SchedulerConfig {
            configs: vec![],
            scheduled_time: Some("12:00:00".to_string()),
            scheduled_date: None,
            success_wait_secs: 1,
            failure_wait_secs: 1,
            max_retries: 1,
        };
        let now = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(resolve_start(&config, now), Duration::from_secs(2 * 3600));
    }
}
