use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::info;

/// Cooperative lifecycle state. Only RUNNING transitions to PAUSED; only
/// RUNNING/PAUSED transition to STOPPING. STOPPED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Idle,
    Running,
    Paused,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub workflow_name: String,
    pub action_index: usize,
    pub variables: std::collections::HashMap<String, crate::variables::Value>,
    pub result_so_far: serde_json::Value,
}

/// Drives cooperative pause/resume/stop signalling for one engine run.
/// The engine consults `check_should_stop`/`await_resume` at every yield
/// point named in the concurrency model.
pub struct Controller {
    state: std::sync::Mutex<ControllerState>,
    stop_requested: AtomicBool,
    emergency: AtomicBool,
    resume_notify: Arc<Notify>,
    started_at: std::sync::Mutex<Option<Instant>>,
    total_actions: AtomicUsize,
    checkpoints: std::sync::Mutex<std::collections::HashMap<String, Checkpoint>>,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(ControllerState::Idle),
            stop_requested: AtomicBool::new(false),
            emergency: AtomicBool::new(false),
            resume_notify: Arc::new(Notify::new()),
            started_at: std::sync::Mutex::new(None),
            total_actions: AtomicUsize::new(0),
            checkpoints: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    pub fn start(&self, total_actions: usize) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != ControllerState::Idle {
            return false;
        }
        *state = ControllerState::Running;
        self.total_actions.store(total_actions, Ordering::Relaxed);
        *self.started_at.lock().unwrap() = Some(Instant::now());
        info!("controller started with {} actions", total_actions);
        true
    }

    pub fn request_pause(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != ControllerState::Running {
            return false;
        }
        *state = ControllerState::Paused;
        info!("controller paused");
        true
    }

    pub fn request_resume(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != ControllerState::Paused {
            return false;
        }
        *state = ControllerState::Running;
        self.resume_notify.notify_waiters();
        info!("controller resumed");
        true
    }

    /// Stop supersedes pause: if both are pending the engine observes stop.
    pub fn request_stop(&self, emergency: bool) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if emergency {
            self.emergency.store(true, Ordering::SeqCst);
        }
        let mut state = self.state.lock().unwrap();
        if matches!(*state, ControllerState::Running | ControllerState::Paused) {
            *state = ControllerState::Stopping;
        }
        // Wake anything parked in await_resume so it can observe the stop.
        self.resume_notify.notify_waiters();
        info!("stop requested (emergency={})", emergency);
    }

    pub fn finish_stopping(&self) {
        *self.state.lock().unwrap() = ControllerState::Stopped;
    }

    pub fn check_should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }

    /// Pause point: blocks while PAUSED, returns immediately if stop has been
    /// requested (stop supersedes pause) or if not paused.
    pub async fn await_resume(&self) {
        loop {
            if self.check_should_stop() {
                return;
            }
            if self.state() != ControllerState::Paused {
                return;
            }
            self.resume_notify.notified().await;
        }
    }

    pub fn save_checkpoint(
        &self,
        workflow_name: &str,
        action_index: usize,
        variables: std::collections::HashMap<String, crate::variables::Value>,
        result_so_far: serde_json::Value,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let checkpoint = Checkpoint {
            id: id.clone(),
            timestamp: chrono::Utc::now(),
            workflow_name: workflow_name.to_string(),
            action_index,
            variables,
            result_so_far,
        };
        self.checkpoints
            .lock()
            .unwrap()
            .insert(id.clone(), checkpoint);
        id
    }

    pub fn load_checkpoint(&self, id: &str) -> Result<Checkpoint, RuntimeError> {
        self.checkpoints
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::Validation(format!("no such checkpoint: {id}")))
    }

    pub fn write_checkpoint_file(path: &std::path::Path, cp: &Checkpoint) -> Result<(), RuntimeError> {
        let json = serde_json::to_string_pretty(cp)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_checkpoint_file(path: &std::path::Path) -> Result<Checkpoint, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_running_to_paused_to_running() {
        let c = Controller::new();
        assert!(c.start(5));
        assert!(c.request_pause());
        assert_eq!(c.state(), ControllerState::Paused);
        assert!(c.request_resume());
        assert_eq!(c.state(), ControllerState::Running);
    }

    #[test]
    fn cannot_pause_from_idle() {
        let c = Controller::new();
        assert!(!c.request_pause());
    }

    #[test]
    fn stop_supersedes_pause() {
        let c = Controller::new();
        c.start(1);
        c.request_pause();
        c.request_stop(false);
        assert!(c.check_should_stop());
        assert_eq!(c.state(), ControllerState::Stopping);
    }

    #[tokio::test]
    async fn await_resume_returns_immediately_when_stopped() {
        let c = Controller::new();
        c.start(1);
        c.request_pause();
        c.request_stop(false);
        tokio::time::timeout(std::time::Duration::from_millis(100), c.await_resume())
            .await
            .expect("await_resume should not block once stop is requested");
    }

    #[test]
    fn checkpoint_roundtrip() {
        let c = Controller::new();
        let id = c.save_checkpoint("wf", 3, Default::default(), serde_json::json!({}));
        let cp = c.load_checkpoint(&id).unwrap();
        assert_eq!(cp.action_index, 3);
        assert_eq!(cp.workflow_name, "wf");
    }
}
