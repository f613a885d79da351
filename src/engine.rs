//! ExecutionEngine (C5): interprets an action list plus its block structure,
//! drives the BrowserDriver through action handlers, honors Controller
//! signals, and applies per-action retries.

use crate::actions::ActionRegistry;
use crate::config::{Action, ActionKind, AutomationConfig};
use crate::controller::Controller;
use crate::driver::BrowserDriver;
use crate::error::RuntimeError;
use crate::variables::VariableStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub success: bool,
    pub actual: String,
    pub expected: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    While,
}

#[derive(Debug, Clone)]
pub struct BlockFrame {
    pub kind: BlockKind,
    pub begin_index: usize,
    pub end_index: usize,
    pub taken_branch: bool,
    pub loop_guard: usize,
}

/// Mutable per-run state threaded through every handler invocation.
pub struct ExecutionContext {
    pub instruction_pointer: usize,
    pub variables: VariableStore,
    pub last_check_result: Option<CheckResult>,
    pub block_stack: Vec<BlockFrame>,
    pub should_increment: bool,
    pub default_timeout_ms: u64,
    pub error_log: Vec<String>,
    pub log_messages: Vec<String>,
    pub pending_generation_download: Option<serde_json::Value>,
    pub generation_stop_requested: bool,
    pub generation_downloaded_count: u64,
}

impl ExecutionContext {
    pub fn new(config: &AutomationConfig) -> Self {
        Self {
            instruction_pointer: 0,
            variables: VariableStore::from_map(config.variables.clone()),
            last_check_result: None,
            block_stack: Vec::new(),
            should_increment: true,
            default_timeout_ms: config.default_timeout_ms,
            error_log: Vec::new(),
            log_messages: Vec::new(),
            pending_generation_download: None,
            generation_stop_requested: false,
            generation_downloaded_count: 0,
        }
    }
}

/// Precomputed BEGIN/END and branch-sibling relations for a validated
/// action list, resolving the cyclic-seeming block references into flat
/// index pairs (design note: "no pointer cycles").
#[derive(Debug, Default)]
pub struct BlockMap {
    /// IF_BEGIN/ELIF/ELSE index -> index of next sibling branch marker or
    /// IF_END at the same nesting depth.
    branch_next: HashMap<usize, usize>,
    while_begin_to_end: HashMap<usize, usize>,
    while_end_to_begin: HashMap<usize, usize>,
}

impl BlockMap {
    pub fn build(actions: &[Action]) -> Result<Self, RuntimeError> {
        enum Meta {
            If(Vec<usize>),
            While(usize),
        }
        let mut stack: Vec<Meta> = Vec::new();
        let mut map = BlockMap::default();

        for (idx, action) in actions.iter().enumerate() {
            match action.kind {
                ActionKind::IfBegin => stack.push(Meta::If(vec![idx])),
                ActionKind::Elif | ActionKind::Else => {
                    if let Some(Meta::If(branches)) = stack.last_mut() {
                        branches.push(idx);
                    } else {
                        return Err(RuntimeError::Validation(format!(
                            "{:?} at {idx} outside IF block",
                            action.kind
                        )));
                    }
                }
                ActionKind::IfEnd => match stack.pop() {
                    Some(Meta::If(branches)) => {
                        for pair in branches.windows(2) {
                            map.branch_next.insert(pair[0], pair[1]);
                        }
                        if let Some(&last) = branches.last() {
                            map.branch_next.insert(last, idx);
                        }
                    }
                    _ => {
                        return Err(RuntimeError::Validation(format!(
                            "IF_END at {idx} has no matching IF_BEGIN"
                        )))
                    }
                },
                ActionKind::WhileBegin => stack.push(Meta::While(idx)),
                ActionKind::WhileEnd => match stack.pop() {
                    Some(Meta::While(begin)) => {
                        map.while_begin_to_end.insert(begin, idx);
                        map.while_end_to_begin.insert(idx, begin);
                    }
                    _ => {
                        return Err(RuntimeError::Validation(format!(
                            "WHILE_END at {idx} has no matching WHILE_BEGIN"
                        )))
                    }
                },
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(RuntimeError::Validation(
                "unclosed block at end of action list".into(),
            ));
        }

        Ok(map)
    }

    fn next_branch(&self, idx: usize) -> Option<usize> {
        self.branch_next.get(&idx).copied()
    }

    fn while_end(&self, begin: usize) -> Option<usize> {
        self.while_begin_to_end.get(&begin).copied()
    }

    fn while_begin(&self, end: usize) -> Option<usize> {
        self.while_end_to_begin.get(&end).copied()
    }
}

/// Condition kinds recognized by IF/ELIF/WHILE/SKIP_IF, evaluated against
/// `ctx.last_check_result` or the variable store.
fn evaluate_condition(
    condition: &serde_json::Value,
    ctx: &ExecutionContext,
) -> Result<bool, RuntimeError> {
    let kind = condition
        .get("condition")
        .and_then(|v| v.as_str())
        .unwrap_or("always_true");

    Ok(match kind {
        "always_true" => true,
        "check_passed" => ctx.last_check_result.as_ref().map(|r| r.success).unwrap_or(false),
        "check_failed" => ctx.last_check_result.as_ref().map(|r| !r.success).unwrap_or(true),
        "value_equals" => {
            let name = condition.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let expected = condition
                .get("value")
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default();
            ctx.variables
                .get(name)
                .map(|v| v.as_str_form() == expected)
                .unwrap_or(false)
        }
        "value_not_equals" => {
            let name = condition.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let expected = condition
                .get("value")
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default();
            ctx.variables
                .get(name)
                .map(|v| v.as_str_form() != expected)
                .unwrap_or(true)
        }
        other => {
            return Err(RuntimeError::Validation(format!(
                "unknown condition kind '{other}'"
            )))
        }
    })
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub ok: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub action_index: Option<usize>,
    pub duration: Duration,
    pub log_messages: Vec<String>,
}

pub struct ExecutionEngine {
    pub config: AutomationConfig,
    pub registry: Arc<ActionRegistry>,
    pub driver: Arc<dyn BrowserDriver>,
    pub controller: Arc<Controller>,
    block_map: BlockMap,
}

const LOOP_GUARD_LIMIT: usize = 1_000_000;

impl ExecutionEngine {
    pub fn new(
        config: AutomationConfig,
        registry: Arc<ActionRegistry>,
        driver: Arc<dyn BrowserDriver>,
        controller: Arc<Controller>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        registry.validate_actions(&config.actions)?;
        let block_map = BlockMap::build(&config.actions)?;
        Ok(Self {
            config,
            registry,
            driver,
            controller,
            block_map,
        })
    }

    pub async fn run(&self) -> Result<ExecutionResult, RuntimeError> {
        let start = Instant::now();
        let timeout = Duration::from_millis(self.config.default_timeout_ms);
        self.driver.navigate(&self.config.url, timeout).await?;

        let mut ctx = ExecutionContext::new(&self.config);
        self.controller.start(self.config.actions.len());

        let outcome = self.main_loop(&mut ctx).await;

        if !self.config.keep_browser_open {
            let _ = self.driver.close().await;
        }

        match outcome {
            Ok(()) => {
                self.controller.finish_stopping();
                Ok(ExecutionResult {
                    ok: true,
                    error_kind: None,
                    error_message: None,
                    action_index: None,
                    duration: start.elapsed(),
                    log_messages: ctx.log_messages,
                })
            }
            Err((err, idx)) => {
                self.controller.finish_stopping();
                Ok(ExecutionResult {
                    ok: false,
                    error_kind: Some(err.kind_name().to_string()),
                    error_message: Some(err.to_string()),
                    action_index: idx,
                    duration: start.elapsed(),
                    log_messages: ctx.log_messages,
                })
            }
        }
    }

    /// The interpreter loop, following the pseudocode in the design:
    /// pause point -> stop point -> substitute -> dispatch -> advance.
    async fn main_loop(&self, ctx: &mut ExecutionContext) -> Result<(), (RuntimeError, Option<usize>)> {
        let actions = &self.config.actions;

        while ctx.instruction_pointer < actions.len() {
            self.controller.await_resume().await;
            if self.controller.check_should_stop() {
                info!("engine observed stop request at ip={}", ctx.instruction_pointer);
                break;
            }

            let ip = ctx.instruction_pointer;
            let action = &actions[ip];
            ctx.should_increment = true;

            if let Err(err) = self.dispatch(action, ip, ctx).await {
                if matches!(err, RuntimeError::AutomationStopped(_)) {
                    return Err((err, Some(ip)));
                }
                ctx.error_log.push(format!("action {ip}: {err}"));
                if !action.effective_continue_on_error() {
                    return Err((err, Some(ip)));
                }
                warn!("action {ip} failed but continue_on_error is set: {err}");
            }

            if ctx.should_increment {
                ctx.instruction_pointer += 1;
            }
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        action: &Action,
        ip: usize,
        ctx: &mut ExecutionContext,
    ) -> Result<(), RuntimeError> {
        match action.kind {
            ActionKind::IfBegin => self.handle_if_begin(action, ip, ctx),
            ActionKind::Elif | ActionKind::Else => self.handle_elif_else(action, ip, ctx),
            ActionKind::IfEnd => {
                ctx.block_stack.pop();
                Ok(())
            }
            ActionKind::WhileBegin => self.handle_while_begin(action, ip, ctx),
            ActionKind::WhileEnd => self.handle_while_end(ip, ctx),
            ActionKind::Break => self.handle_break(ctx),
            ActionKind::Continue => self.handle_continue(ctx),
            ActionKind::SkipIf => self.handle_skip_if(action, ctx),
            ActionKind::ConditionalWait => self.handle_conditional_wait(action, ctx).await,
            ActionKind::StopAutomation => {
                ctx.instruction_pointer = usize::MAX / 2;
                ctx.should_increment = false;
                Err(RuntimeError::AutomationStopped(
                    action
                        .description
                        .clone()
                        .unwrap_or_else(|| "STOP_AUTOMATION executed".to_string()),
                ))
            }
            _ => self.dispatch_handler(action, ctx).await,
        }
    }

    async fn dispatch_handler(&self, action: &Action, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let handler = self
            .registry
            .get(action.kind)
            .ok_or_else(|| RuntimeError::Validation(format!("no handler for {:?}", action.kind)))?;

        let selector = action.selector.as_deref().map(|s| ctx.variables.substitute(s));
        let value = action.value.as_ref().map(|v| substitute_json(v, &ctx.variables));

        handler
            .execute(action, selector.as_deref(), value.as_ref(), ctx, self.driver.as_ref())
            .await?;
        Ok(())
    }

    fn handle_if_begin(&self, action: &Action, ip: usize, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let condition = action.value.clone().unwrap_or(serde_json::json!({}));
        let taken = evaluate_condition(&condition, ctx)?;
        let end_index = self.if_end_of(ip);
        ctx.block_stack.push(BlockFrame {
            kind: BlockKind::If,
            begin_index: ip,
            end_index,
            taken_branch: taken,
            loop_guard: 0,
        });
        if !taken {
            let next = self
                .block_map
                .next_branch(ip)
                .ok_or_else(|| RuntimeError::Validation("IF_BEGIN missing branch map".into()))?;
            ctx.instruction_pointer = next;
            ctx.should_increment = false;
        }
        Ok(())
    }

    fn handle_elif_else(&self, action: &Action, ip: usize, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let frame = ctx
            .block_stack
            .last_mut()
            .ok_or_else(|| RuntimeError::Validation(format!("{:?} at {ip} outside IF", action.kind)))?;

        if frame.taken_branch {
            let end = frame.end_index;
            ctx.instruction_pointer = end;
            ctx.should_increment = false;
            return Ok(());
        }

        let taken = if matches!(action.kind, ActionKind::Else) {
            true
        } else {
            let condition = action.value.clone().unwrap_or(serde_json::json!({}));
            evaluate_condition(&condition, ctx)?
        };

        let frame = ctx.block_stack.last_mut().unwrap();
        frame.taken_branch = taken;

        if !taken {
            let next = self
                .block_map
                .next_branch(ip)
                .ok_or_else(|| RuntimeError::Validation("ELIF/ELSE missing branch map".into()))?;
            ctx.instruction_pointer = next;
            ctx.should_increment = false;
        }
        Ok(())
    }

    fn handle_while_begin(&self, action: &Action, ip: usize, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let end_index = self
            .block_map
            .while_end(ip)
            .ok_or_else(|| RuntimeError::Validation("WHILE_BEGIN missing end map".into()))?;

        let existing_guard = ctx
            .block_stack
            .iter()
            .rev()
            .find(|f| f.kind == BlockKind::While && f.begin_index == ip)
            .map(|f| f.loop_guard)
            .unwrap_or(0);

        let condition = action.value.clone().unwrap_or(serde_json::json!({}));
        let taken = evaluate_condition(&condition, ctx)?;

        ctx.block_stack.push(BlockFrame {
            kind: BlockKind::While,
            begin_index: ip,
            end_index,
            taken_branch: taken,
            loop_guard: existing_guard,
        });

        if !taken {
            ctx.instruction_pointer = end_index;
            ctx.should_increment = false;
        }
        Ok(())
    }

    fn handle_while_end(&self, ip: usize, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let begin = self
            .block_map
            .while_begin(ip)
            .ok_or_else(|| RuntimeError::Validation("WHILE_END missing begin map".into()))?;

        let frame = ctx
            .block_stack
            .last()
            .filter(|f| f.kind == BlockKind::While && f.begin_index == begin)
            .ok_or_else(|| RuntimeError::Validation("WHILE_END without matching frame".into()))?;

        let condition = self.config.actions[begin].value.clone().unwrap_or(serde_json::json!({}));
        let taken = evaluate_condition(&condition, ctx)?;
        let guard = frame.loop_guard + 1;

        if taken && guard < LOOP_GUARD_LIMIT {
            if let Some(top) = ctx.block_stack.last_mut() {
                top.loop_guard = guard;
            }
            ctx.instruction_pointer = begin + 1;
            ctx.should_increment = false;
        } else {
            ctx.block_stack.pop();
        }
        Ok(())
    }

    fn handle_break(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        while let Some(frame) = ctx.block_stack.pop() {
            if frame.kind == BlockKind::While {
                ctx.instruction_pointer = frame.end_index + 1;
                ctx.should_increment = false;
                return Ok(());
            }
        }
        Err(RuntimeError::Validation("BREAK outside WHILE".into()))
    }

    fn handle_continue(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        while let Some(frame) = ctx.block_stack.last() {
            if frame.kind == BlockKind::While {
                ctx.instruction_pointer = frame.end_index;
                ctx.should_increment = false;
                return Ok(());
            }
            ctx.block_stack.pop();
        }
        Err(RuntimeError::Validation("CONTINUE outside WHILE".into()))
    }

    fn handle_skip_if(&self, action: &Action, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let condition = action.value.clone().unwrap_or(serde_json::json!({}));
        if evaluate_condition(&condition, ctx)? {
            ctx.instruction_pointer += 2;
            ctx.should_increment = false;
        }
        Ok(())
    }

    async fn handle_conditional_wait(&self, action: &Action, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let value = action.value.clone().unwrap_or(serde_json::json!({}));
        let initial_wait = value.get("initial_wait_ms").and_then(|v| v.as_u64()).unwrap_or(250);
        let multiplier = value.get("multiplier").and_then(|v| v.as_f64()).unwrap_or(2.0);
        let max_wait = value.get("max_wait_ms").and_then(|v| v.as_u64()).unwrap_or(10_000);
        let max_attempts = value.get("max_attempts").and_then(|v| v.as_u64()).unwrap_or(5);

        let mut wait = initial_wait;
        for attempt in 0..max_attempts {
            if ctx.last_check_result.as_ref().map(|r| r.success).unwrap_or(false) {
                return Ok(());
            }
            if attempt + 1 == max_attempts {
                break;
            }
            tokio::time::sleep(Duration::from_millis(wait)).await;
            wait = ((wait as f64) * multiplier).min(max_wait as f64) as u64;
        }

        if action.effective_continue_on_error() {
            Ok(())
        } else {
            Err(RuntimeError::Timeout(Duration::from_millis(wait)))
        }
    }

    fn if_end_of(&self, begin: usize) -> usize {
        let mut depth = 0;
        for (idx, action) in self.config.actions.iter().enumerate().skip(begin) {
            match action.kind {
                ActionKind::IfBegin => depth += 1,
                ActionKind::IfEnd => {
                    depth -= 1;
                    if depth == 0 {
                        return idx;
                    }
                }
                _ => {}
            }
        }
        self.config.actions.len()
    }
}

fn substitute_json(value: &serde_json::Value, store: &VariableStore) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(store.substitute(s)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| substitute_json(v, store)).collect())
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_json(v, store));
            }
            serde_json::Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserOpts, Viewport};
    use crate::driver::ElementSnapshot;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;
    use std::sync::Mutex;

    struct MockDriver {
        log: Mutex<Vec<String>>,
    }

    impl MockDriver {
        fn new() -> Self {
            Self {
                log: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for MockDriver {
        async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn query(&self, selector: &str, _timeout: Duration) -> Result<ElementSnapshot, RuntimeError> {
            Ok(ElementSnapshot {
                id: selector.to_string(),
                text: String::new(),
                html: String::new(),
                visible: true,
                bounding_top: 0.0,
                bounding_area: 0.0,
            })
        }
        async fn query_all(&self, _selector: &str) -> Result<Vec<ElementSnapshot>, RuntimeError> {
            Ok(vec![])
        }
        async fn click(&self, _element: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn fill(&self, _element: &str, _text: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn read_attribute(&self, _element: &str, _attribute: &str) -> Result<String, RuntimeError> {
            Ok(String::new())
        }
        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn scroll_by(&self, _dx: f64, _dy: f64) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<String, RuntimeError> {
            Ok(String::new())
        }
        async fn refresh(&self, _timeout: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn upload_file(&self, _element: &str, _path: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn list_download_dir(&self, _dir: &str) -> Result<Vec<String>, RuntimeError> {
            Ok(vec![])
        }
        async fn close(&self) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn action(kind: ActionKind, value: Option<serde_json::Value>) -> Action {
        Action {
            kind,
            selector: None,
            value,
            timeout_ms: None,
            description: None,
            continue_on_error: None,
        }
    }

    fn make_engine(actions: Vec<Action>) -> ExecutionEngine {
        let config = AutomationConfig {
            name: "t".into(),
            url: "https://example.com".into(),
            headless: true,
            keep_browser_open: true,
            browser: BrowserOpts {
                browser_type: "chromium".into(),
                viewport: Viewport::default(),
                args: vec![],
            },
            variables: Map::new(),
            actions,
            default_timeout_ms: 1000,
        };
        ExecutionEngine::new(
            config,
            Arc::new(ActionRegistry::new()),
            Arc::new(MockDriver::new()),
            Arc::new(Controller::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn s1_if_elif_else_dispatch() {
        // SET x=2, CHECK value_equals x 1, IF check_passed -> LOG "a"
        // ELIF value_equals x 2 -> LOG "b" ELSE -> LOG "c" IF_END
        let actions = vec![
            action(ActionKind::SetVariable, Some(serde_json::json!({"name": "x", "value": 2}))),
            action(
                ActionKind::CheckElement,
                Some(serde_json::json!({"check": "equals", "value": "1"})),
            ),
            action(ActionKind::IfBegin, Some(serde_json::json!({"condition": "check_passed"}))),
            action(ActionKind::LogMessage, Some(serde_json::json!("a"))),
            action(
                ActionKind::Elif,
                Some(serde_json::json!({"condition": "value_equals", "name": "x", "value": 2})),
            ),
            action(ActionKind::LogMessage, Some(serde_json::json!("b"))),
            action(ActionKind::Else, None),
            action(ActionKind::LogMessage, Some(serde_json::json!("c"))),
            action(ActionKind::IfEnd, None),
        ];
        let engine = make_engine(actions);
        let mut ctx = ExecutionContext::new(&engine.config);
        // CheckElementHandler with a mock driver that returns empty text,
        // so "equals 1" fails -> check_passed is false -> first IF falls
        // through to ELIF.
        engine.main_loop(&mut ctx).await.unwrap();
        assert_eq!(ctx.log_messages, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn s2_while_with_break() {
        // SET i=0, WHILE always_true, INCREMENT i 1,
        // CHECK value_equals i 3, IF check_passed BREAK IF_END, WHILE_END
        let actions = vec![
            action(ActionKind::SetVariable, Some(serde_json::json!({"name": "i", "value": 0}))),
            action(ActionKind::WhileBegin, Some(serde_json::json!({"condition": "always_true"}))),
            action(ActionKind::IncrementVariable, Some(serde_json::json!({"name": "i", "increment": 1}))),
            action(
                ActionKind::SetVariable,
                Some(serde_json::json!({"name": "__noop", "value": 0})),
            ),
            action(ActionKind::IfBegin, Some(serde_json::json!({"condition": "value_equals", "name": "i", "value": 3}))),
            action(ActionKind::Break, None),
            action(ActionKind::IfEnd, None),
            action(ActionKind::WhileEnd, None),
        ];
        let engine = make_engine(actions);
        let mut ctx = ExecutionContext::new(&engine.config);
        engine.main_loop(&mut ctx).await.unwrap();
        assert_eq!(ctx.variables.get("i").unwrap().as_number(), Some(3.0));
    }

    #[tokio::test]
    async fn stop_automation_is_fatal() {
        let actions = vec![action(ActionKind::StopAutomation, None)];
        let engine = make_engine(actions);
        let mut ctx = ExecutionContext::new(&engine.config);
        let result = engine.main_loop(&mut ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn controller_stop_halts_before_next_action() {
        let actions = vec![
            action(ActionKind::LogMessage, Some(serde_json::json!("first"))),
            action(ActionKind::LogMessage, Some(serde_json::json!("second"))),
        ];
        let engine = make_engine(actions);
        engine.controller.request_stop(false);
        let mut ctx = ExecutionContext::new(&engine.config);
        engine.main_loop(&mut ctx).await.unwrap();
        assert!(ctx.log_messages.is_empty());
    }
}
