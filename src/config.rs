//! Workflow configuration: `AutomationConfig`, `Action`, and the
//! scheduler/downloader config structs loaded from JSON or YAML.

use crate::error::RuntimeError;
use crate::variables::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One entry in an action list. `selector`/`value` are substituted by the
/// engine before dispatch; handlers must read the substituted copies from
/// the execution context, never `action.value` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub continue_on_error: Option<bool>,
}

impl Action {
    /// Per-kind default for `continue_on_error` when the action doesn't
    /// override it (open question #2 in SPEC_FULL.md).
    pub fn continue_on_error_default(&self) -> bool {
        use ActionKind::*;
        matches!(
            self.kind,
            CheckElement
                | CheckQueue
                | LogMessage
                | SetVariable
                | IncrementVariable
                | CheckGenerationStatus
        )
    }

    pub fn effective_continue_on_error(&self) -> bool {
        self.continue_on_error
            .unwrap_or_else(|| self.continue_on_error_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    InputText,
    ClickButton,
    UploadFile,
    ToggleSetting,
    Wait,
    WaitForElement,
    RefreshPage,
    ExpandDialog,
    SwitchPanel,
    CheckElement,
    CheckQueue,
    SetVariable,
    IncrementVariable,
    LogMessage,
    Login,
    DownloadFile,
    IfBegin,
    Elif,
    Else,
    IfEnd,
    WhileBegin,
    WhileEnd,
    Break,
    Continue,
    SkipIf,
    ConditionalWait,
    StopAutomation,
    StartGenerationDownloads,
    StopGenerationDownloads,
    CheckGenerationStatus,
}

impl ActionKind {
    pub fn is_block_begin(&self) -> bool {
        matches!(self, ActionKind::IfBegin | ActionKind::WhileBegin)
    }

    pub fn is_block_end(&self) -> bool {
        matches!(self, ActionKind::IfEnd | ActionKind::WhileEnd)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOpts {
    #[serde(default = "default_browser_type")]
    pub browser_type: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_browser_type() -> String {
    "chromium".to_string()
}

impl Default for BrowserOpts {
    fn default() -> Self {
        Self {
            browser_type: default_browser_type(),
            viewport: Viewport::default(),
            args: Vec::new(),
        }
    }
}

/// A complete workflow definition, loaded from JSON or YAML per §6 of the
/// external interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub keep_browser_open: bool,
    #[serde(default)]
    pub browser: BrowserOpts,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_action_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_action_timeout_ms() -> u64 {
    30_000
}

impl AutomationConfig {
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: AutomationConfig = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates block balance (invariant in §3 of the data model) and that
    /// ELIF/ELSE/BREAK/CONTINUE occur only inside the matching open block
    /// kind. Fatal at load time per the error taxonomy (`Validation`).
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let mut stack: Vec<ActionKind> = Vec::new();

        for (idx, action) in self.actions.iter().enumerate() {
            match action.kind {
                ActionKind::IfBegin | ActionKind::WhileBegin => stack.push(action.kind),
                ActionKind::IfEnd => match stack.pop() {
                    Some(ActionKind::IfBegin) => {}
                    _ => {
                        return Err(RuntimeError::Validation(format!(
                            "IF_END at action {idx} has no matching IF_BEGIN"
                        )))
                    }
                },
                ActionKind::WhileEnd => match stack.pop() {
                    Some(ActionKind::WhileBegin) => {}
                    _ => {
                        return Err(RuntimeError::Validation(format!(
                            "WHILE_END at action {idx} has no matching WHILE_BEGIN"
                        )))
                    }
                },
                ActionKind::Elif | ActionKind::Else => {
                    if stack.last() != Some(&ActionKind::IfBegin) {
                        return Err(RuntimeError::Validation(format!(
                            "{:?} at action {idx} outside an open IF block",
                            action.kind
                        )));
                    }
                }
                ActionKind::Break | ActionKind::Continue => {
                    if !stack.iter().any(|k| *k == ActionKind::WhileBegin) {
                        return Err(RuntimeError::Validation(format!(
                            "{:?} at action {idx} outside an open WHILE block",
                            action.kind
                        )));
                    }
                }
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(RuntimeError::Validation(format!(
                "{} unclosed block(s) at end of action list",
                stack.len()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub configs: Vec<std::path::PathBuf>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default = "default_success_wait")]
    pub success_wait_secs: u64,
    #[serde(default = "default_failure_wait")]
    pub failure_wait_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_success_wait() -> u64 {
    5
}
fn default_failure_wait() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    Skip,
    Finish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub config: std::path::PathBuf,
    #[serde(default = "default_max_downloads")]
    pub max_downloads: u64,
    pub downloads_folder: std::path::PathBuf,
    #[serde(default = "default_duplicate_mode")]
    pub duplicate_mode: DuplicateMode,
    #[serde(default)]
    pub start_from: Option<String>,
}

fn default_max_downloads() -> u64 {
    u64::MAX
}

fn default_duplicate_mode() -> DuplicateMode {
    DuplicateMode::Skip
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: ActionKind) -> Action {
        Action {
            kind,
            selector: None,
            value: None,
            timeout_ms: None,
            description: None,
            continue_on_error: None,
        }
    }

    fn base_config(actions: Vec<Action>) -> AutomationConfig {
        AutomationConfig {
            name: "t".into(),
            url: "https://example.com".into(),
            headless: true,
            keep_browser_open: false,
            browser: BrowserOpts::default(),
            variables: HashMap::new(),
            actions,
            default_timeout_ms: 30_000,
        }
    }

    #[test]
    fn validates_balanced_blocks() {
        let config = base_config(vec![
            action(ActionKind::IfBegin),
            action(ActionKind::Else),
            action(ActionKind::IfEnd),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unclosed_if() {
        let config = base_config(vec![action(ActionKind::IfBegin)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_break_outside_while() {
        let config = base_config(vec![action(ActionKind::Break)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn continue_on_error_defaults_follow_table() {
        assert!(action(ActionKind::CheckElement).continue_on_error_default());
        assert!(!action(ActionKind::ClickButton).continue_on_error_default());
    }
}
