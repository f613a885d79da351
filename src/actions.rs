//! ActionRegistry (C4): maps an action kind to a handler implementing
//! `execute(action, ctx) -> { success, data?, error?, execution_time }`.
//! Control-flow kinds (IF/WHILE/BREAK/CONTINUE/SKIP_IF/CONDITIONAL_WAIT/
//! STOP_AUTOMATION) are interpreted directly by the engine's main loop and
//! are never dispatched through this registry, per the design notes on
//! keeping control-flow sentinels out of handler return types.

use crate::config::{Action, ActionKind};
use crate::driver::BrowserDriver;
use crate::engine::ExecutionContext;
use crate::error::RuntimeError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time: Duration,
}

impl ActionOutcome {
    fn ok(data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            execution_time: Duration::default(),
        }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Fields the action's `value` object must carry; validated at load
    /// time (§4.3).
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError>;
}

pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        let mut handlers: HashMap<ActionKind, Box<dyn ActionHandler>> = HashMap::new();
        handlers.insert(ActionKind::InputText, Box::new(InputTextHandler));
        handlers.insert(ActionKind::ClickButton, Box::new(ClickButtonHandler));
        handlers.insert(ActionKind::UploadFile, Box::new(UploadFileHandler));
        handlers.insert(ActionKind::ToggleSetting, Box::new(ToggleSettingHandler));
        handlers.insert(ActionKind::Wait, Box::new(WaitHandler));
        handlers.insert(ActionKind::WaitForElement, Box::new(WaitForElementHandler));
        handlers.insert(ActionKind::RefreshPage, Box::new(RefreshPageHandler));
        handlers.insert(ActionKind::ExpandDialog, Box::new(ExpandDialogHandler));
        handlers.insert(ActionKind::SwitchPanel, Box::new(SwitchPanelHandler));
        handlers.insert(ActionKind::CheckElement, Box::new(CheckElementHandler));
        handlers.insert(ActionKind::CheckQueue, Box::new(CheckQueueHandler));
        handlers.insert(ActionKind::SetVariable, Box::new(SetVariableHandler));
        handlers.insert(
            ActionKind::IncrementVariable,
            Box::new(IncrementVariableHandler),
        );
        handlers.insert(ActionKind::LogMessage, Box::new(LogMessageHandler));
        handlers.insert(ActionKind::Login, Box::new(LoginHandler));
        handlers.insert(ActionKind::DownloadFile, Box::new(DownloadFileHandler));
        handlers.insert(
            ActionKind::StartGenerationDownloads,
            Box::new(StartGenerationDownloadsHandler),
        );
        handlers.insert(
            ActionKind::StopGenerationDownloads,
            Box::new(StopGenerationDownloadsHandler),
        );
        handlers.insert(
            ActionKind::CheckGenerationStatus,
            Box::new(CheckGenerationStatusHandler),
        );
        Self { handlers }
    }

    pub fn get(&self, kind: ActionKind) -> Option<&dyn ActionHandler> {
        self.handlers.get(&kind).map(|b| b.as_ref())
    }

    /// Validates required fields are present for every dispatchable action
    /// in a config; called alongside block-balance validation at load time.
    pub fn validate_actions(&self, actions: &[Action]) -> Result<(), RuntimeError> {
        for (idx, action) in actions.iter().enumerate() {
            if action.kind.is_block_begin() || action.kind.is_block_end() {
                continue;
            }
            if let Some(handler) = self.get(action.kind) {
                let required = handler.required_fields();
                if required.is_empty() {
                    continue;
                }
                let obj = action.value.as_ref().and_then(|v| v.as_object());
                for field in required {
                    let present = obj.map(|o| o.contains_key(*field)).unwrap_or(false);
                    if !present {
                        return Err(RuntimeError::Validation(format!(
                            "action {idx} ({:?}) missing required field '{field}'",
                            action.kind
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn timeout_of(action: &Action, ctx: &ExecutionContext) -> Duration {
    Duration::from_millis(action.timeout_ms.unwrap_or(ctx.default_timeout_ms))
}

fn require_selector<'a>(selector: Option<&'a str>) -> Result<&'a str, RuntimeError> {
    selector.ok_or_else(|| RuntimeError::Validation("action requires a selector".into()))
}

struct InputTextHandler;
#[async_trait]
impl ActionHandler for InputTextHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let text = value.and_then(|v| v.as_str()).unwrap_or_default();
        let timeout = timeout_of(action, ctx);
        let element = driver.query(selector, timeout).await?;
        driver.fill(&element.id, text).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct ClickButtonHandler;
#[async_trait]
impl ActionHandler for ClickButtonHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let timeout = timeout_of(action, ctx);
        // CLICK_BUTTON retries once extra after 100ms, per the per-kind retry table.
        let element = match driver.query(selector, timeout).await {
            Ok(el) => el,
            Err(_) => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                driver.query(selector, timeout).await?
            }
        };
        driver.click(&element.id).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct UploadFileHandler;
#[async_trait]
impl ActionHandler for UploadFileHandler {
    fn required_fields(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let path = value
            .and_then(|v| v.get("path"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| RuntimeError::Validation("UPLOAD_FILE requires value.path".into()))?;
        let timeout = timeout_of(action, ctx);
        let element = driver.query(selector, timeout).await?;
        driver.upload_file(&element.id, path).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct ToggleSettingHandler;
#[async_trait]
impl ActionHandler for ToggleSettingHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let timeout = timeout_of(action, ctx);
        let element = driver.query(selector, timeout).await?;
        driver.click(&element.id).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct WaitHandler;
#[async_trait]
impl ActionHandler for WaitHandler {
    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        value: Option<&serde_json::Value>,
        _ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let ms = value.and_then(|v| v.as_u64()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ActionOutcome::ok(None))
    }
}

struct WaitForElementHandler;
#[async_trait]
impl ActionHandler for WaitForElementHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let timeout = timeout_of(action, ctx);
        driver.wait_for_selector(selector, timeout).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct RefreshPageHandler;
#[async_trait]
impl ActionHandler for RefreshPageHandler {
    async fn execute(
        &self,
        action: &Action,
        _selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        driver.refresh(timeout_of(action, ctx)).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct ExpandDialogHandler;
#[async_trait]
impl ActionHandler for ExpandDialogHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let timeout = timeout_of(action, ctx);
        let element = driver.query(selector, timeout).await?;
        driver.click(&element.id).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct SwitchPanelHandler;
#[async_trait]
impl ActionHandler for SwitchPanelHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let timeout = timeout_of(action, ctx);
        let element = driver.query(selector, timeout).await?;
        driver.click(&element.id).await?;
        Ok(ActionOutcome::ok(None))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOp {
    Equals,
    NotEquals,
    Less,
    Greater,
    Contains,
    NotContains,
    NotZero,
    Exists,
}

pub fn evaluate_check(op: &CheckOp, actual: &str, expected: &str) -> bool {
    match op {
        CheckOp::Equals => actual == expected,
        CheckOp::NotEquals => actual != expected,
        CheckOp::Less => actual
            .parse::<f64>()
            .ok()
            .zip(expected.parse::<f64>().ok())
            .map(|(a, e)| a < e)
            .unwrap_or(false),
        CheckOp::Greater => actual
            .parse::<f64>()
            .ok()
            .zip(expected.parse::<f64>().ok())
            .map(|(a, e)| a > e)
            .unwrap_or(false),
        CheckOp::Contains => actual.contains(expected),
        CheckOp::NotContains => !actual.contains(expected),
        CheckOp::NotZero => actual.parse::<f64>().map(|n| n != 0.0).unwrap_or(false),
        CheckOp::Exists => true,
    }
}

struct CheckElementHandler;
#[async_trait]
impl ActionHandler for CheckElementHandler {
    fn required_fields(&self) -> &'static [&'static str] {
        &["check"]
    }

    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let check: CheckOp = value
            .and_then(|v| v.get("check"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| RuntimeError::Validation(e.to_string()))?
            .ok_or_else(|| RuntimeError::Validation("CHECK_ELEMENT requires value.check".into()))?;
        let expected = value
            .and_then(|v| v.get("value"))
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_default();
        let attribute = value
            .and_then(|v| v.get("attribute"))
            .and_then(|v| v.as_str())
            .unwrap_or("text");
        let timeout = timeout_of(action, ctx);

        let (success, actual) = match driver.query(selector, timeout).await {
            Ok(el) => {
                if matches!(check, CheckOp::Exists) {
                    (true, String::new())
                } else {
                    let actual = driver.read_attribute(&el.id, attribute).await.unwrap_or_default();
                    (evaluate_check(&check, &actual, &expected), actual)
                }
            }
            Err(RuntimeError::ElementNotFound(_)) => (false, String::new()),
            Err(e) => return Err(e),
        };

        ctx.last_check_result = Some(crate::engine::CheckResult {
            success,
            actual,
            expected,
        });

        Ok(ActionOutcome::ok(None))
    }
}

/// CHECK_QUEUE is a specialization of CHECK_ELEMENT with `attribute = "text"`
/// and `check` restricted to `{less, greater, equals, not_zero}` (open
/// question #3).
struct CheckQueueHandler;
#[async_trait]
impl ActionHandler for CheckQueueHandler {
    fn required_fields(&self) -> &'static [&'static str] {
        &["check"]
    }

    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let check = value
            .and_then(|v| v.get("check"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !matches!(check, "less" | "greater" | "equals" | "not_zero") {
            return Err(RuntimeError::Validation(format!(
                "CHECK_QUEUE does not support check '{check}'"
            )));
        }
        let mut wrapped = value.cloned().unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = wrapped.as_object_mut() {
            obj.insert("attribute".into(), serde_json::Value::String("text".into()));
        }
        CheckElementHandler
            .execute(action, selector, Some(&wrapped), ctx, driver)
            .await
    }
}

struct SetVariableHandler;
#[async_trait]
impl ActionHandler for SetVariableHandler {
    fn required_fields(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let name = value
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| RuntimeError::Validation("SET_VARIABLE requires value.name".into()))?;
        let raw = value.and_then(|v| v.get("value")).cloned().unwrap_or(serde_json::Value::Null);
        let value = json_to_value(&raw);
        ctx.variables.set(name, value);
        Ok(ActionOutcome::ok(None))
    }
}

struct IncrementVariableHandler;
#[async_trait]
impl ActionHandler for IncrementVariableHandler {
    fn required_fields(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let name = value
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| RuntimeError::Validation("INCREMENT_VARIABLE requires value.name".into()))?;
        let increment = value
            .and_then(|v| v.get("increment"))
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        let updated = ctx.variables.increment(name, increment);
        Ok(ActionOutcome::ok(Some(serde_json::json!({ "value": updated }))))
    }
}

fn json_to_value(v: &serde_json::Value) -> crate::variables::Value {
    match v {
        serde_json::Value::String(s) => crate::variables::Value::String(s.clone()),
        serde_json::Value::Number(n) => crate::variables::Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::Bool(b) => crate::variables::Value::Bool(*b),
        other => crate::variables::Value::String(other.to_string()),
    }
}

struct LogMessageHandler;
#[async_trait]
impl ActionHandler for LogMessageHandler {
    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let message = value
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default();
        info!("workflow log: {}", message);
        ctx.log_messages.push(message.clone());
        Ok(ActionOutcome::ok(Some(serde_json::json!({ "message": message }))))
    }
}

struct LoginHandler;
#[async_trait]
impl ActionHandler for LoginHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let timeout = timeout_of(action, ctx);
        if let Some(selector) = selector {
            let text = value.and_then(|v| v.as_str()).unwrap_or_default();
            let element = driver.query(selector, timeout).await?;
            driver.fill(&element.id, text).await?;
        }
        Ok(ActionOutcome::ok(None))
    }
}

struct DownloadFileHandler;
#[async_trait]
impl ActionHandler for DownloadFileHandler {
    async fn execute(
        &self,
        action: &Action,
        selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let selector = require_selector(selector)?;
        let timeout = timeout_of(action, ctx);
        let element = driver.query(selector, timeout).await?;
        driver.click(&element.id).await?;
        Ok(ActionOutcome::ok(None))
    }
}

struct StartGenerationDownloadsHandler;
#[async_trait]
impl ActionHandler for StartGenerationDownloadsHandler {
    fn required_fields(&self) -> &'static [&'static str] {
        &["downloads_folder"]
    }

    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        // The engine owns spawning the GenerationDownloader (C9); this
        // handler only records the request so the engine can act on it
        // after the action returns, keeping the browser single-owner.
        ctx.pending_generation_download = value.cloned();
        Ok(ActionOutcome::ok(None))
    }
}

struct StopGenerationDownloadsHandler;
#[async_trait]
impl ActionHandler for StopGenerationDownloadsHandler {
    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        ctx.generation_stop_requested = true;
        Ok(ActionOutcome::ok(None))
    }
}

struct CheckGenerationStatusHandler;
#[async_trait]
impl ActionHandler for CheckGenerationStatusHandler {
    async fn execute(
        &self,
        _action: &Action,
        _selector: Option<&str>,
        _value: Option<&serde_json::Value>,
        ctx: &mut ExecutionContext,
        _driver: &dyn BrowserDriver,
    ) -> Result<ActionOutcome, RuntimeError> {
        let downloaded = ctx.generation_downloaded_count;
        ctx.last_check_result = Some(crate::engine::CheckResult {
            success: downloaded > 0,
            actual: downloaded.to_string(),
            expected: "0".to_string(),
        });
        Ok(ActionOutcome::ok(Some(serde_json::json!({ "downloaded": downloaded }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_op_comparisons() {
        assert!(evaluate_check(&CheckOp::Equals, "a", "a"));
        assert!(!evaluate_check(&CheckOp::Equals, "a", "b"));
        assert!(evaluate_check(&CheckOp::Greater, "5", "3"));
        assert!(evaluate_check(&CheckOp::NotZero, "4", ""));
        assert!(!evaluate_check(&CheckOp::NotZero, "0", ""));
        assert!(evaluate_check(&CheckOp::Contains, "hello world", "world"));
    }

    #[test]
    fn registry_has_all_dispatchable_kinds() {
        let registry = ActionRegistry::new();
        assert!(registry.get(ActionKind::ClickButton).is_some());
        assert!(registry.get(ActionKind::CheckQueue).is_some());
        assert!(registry.get(ActionKind::IfBegin).is_none());
    }

    #[test]
    fn validate_actions_rejects_missing_required_field() {
        let registry = ActionRegistry::new();
        let action = Action {
            kind: ActionKind::SetVariable,
            selector: None,
            value: Some(serde_json::json!({})),
            timeout_ms: None,
            description: None,
            continue_on_error: None,
        };
        assert!(registry.validate_actions(&[action]).is_err());
    }
}
