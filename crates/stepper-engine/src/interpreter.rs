//! Sequential command interpreter.
//!
//! A run executes its commands strictly one after another against the page.
//! Step failures are recorded in the execution log and the run continues;
//! `break` and a cancelled interactive pause end it early.

use crate::backend::{BackendError, Page};
use crate::bridge::{BridgeError, PauseBridge};
use crate::config::InterpreterConfig;
use crate::log::{ExecutionLogEntry, LogSink, StepResult};
use crate::observer::ActivityObserver;
use crate::recipe::{RecipeStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stepper_common::event::now_millis;
use stepper_common::protocol::{DialogPolicy, ElementInfo, ToastOptions};
use stepper_common::{
    ChangesAction, Command, CommandInput, DialogAction, RecipeAction, RecordAction, WaitCondition,
};
use stepper_parser::{ParseError, ScriptError, parse_input, parse_script};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Recipe store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// Errors that end the run rather than just the step.
    pub fn is_halt(&self) -> bool {
        matches!(
            self,
            ActionError::Bridge(BridgeError::Cancelled { .. } | BridgeError::Expired { .. })
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Halted,
}

/// What a run returns: the lone result for a single command, else all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutput {
    Single(StepResult),
    Many(Vec<StepResult>),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunState,
    pub log: Vec<ExecutionLogEntry>,
    pub output: RunOutput,
}

pub struct Interpreter {
    page: Arc<dyn Page>,
    observer: Arc<ActivityObserver>,
    bridge: Arc<PauseBridge>,
    recipes: RecipeStore,
    sink: Arc<dyn LogSink>,
    config: InterpreterConfig,
    state: Mutex<RunState>,
}

impl Interpreter {
    pub fn new(
        page: Arc<dyn Page>,
        observer: Arc<ActivityObserver>,
        bridge: Arc<PauseBridge>,
        recipes: RecipeStore,
        sink: Arc<dyn LogSink>,
        config: InterpreterConfig,
    ) -> Self {
        Self {
            page,
            observer,
            bridge,
            recipes,
            sink,
            config,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn observer(&self) -> &Arc<ActivityObserver> {
        &self.observer
    }

    /// Parse every input first; nothing runs if any of them is invalid.
    pub async fn run_inputs(&self, inputs: Vec<CommandInput>) -> Result<RunReport, ParseError> {
        let commands = inputs
            .into_iter()
            .map(parse_input)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.run(commands).await)
    }

    pub async fn run_script(&self, script: &str) -> Result<RunReport, ScriptError> {
        let commands = parse_script(script)?;
        Ok(self.run(commands).await)
    }

    pub async fn run(&self, commands: Vec<Command>) -> RunReport {
        self.set_state(RunState::Running);
        if let Err(e) = self.observer.install(self.page.as_ref()).await {
            warn!("Observer listeners not installed: {}", e);
        }

        let submitted = commands.len();
        let mut log = Vec::with_capacity(submitted);
        let mut status = RunState::Completed;

        for (index, command) in commands.into_iter().enumerate() {
            debug!(step = index + 1, command = %command, "Dispatching");
            let (result, halt) = match self.execute(&command).await {
                Ok(value) => (StepResult::Ok(value), command.is_break()),
                Err(e) => {
                    warn!(step = index + 1, command = %command, "Step failed: {}", e);
                    let halt = e.is_halt() || self.config.stop_on_error;
                    (StepResult::Error(e.to_string()), halt)
                }
            };
            log.push(ExecutionLogEntry { command, result });
            if halt {
                info!(step = index + 1, remaining = submitted - index - 1, "Run halted");
                status = RunState::Halted;
                break;
            }
        }

        if let Err(e) = self.sink.flush(&log).await {
            warn!("Failed to flush execution log: {}", e);
        }
        self.set_state(status);

        let output = if submitted == 1 && log.len() == 1 {
            RunOutput::Single(log[0].result.clone())
        } else {
            RunOutput::Many(log.iter().map(|e| e.result.clone()).collect())
        };
        RunReport {
            status,
            log,
            output,
        }
    }

    async fn execute(&self, command: &Command) -> Result<Value, ActionError> {
        match command {
            Command::Navto { url } => {
                let target = normalize_url(url)?;
                self.page.navigate(&target).await?;
                Ok(format!("Navigated to {}", target).into())
            }
            Command::Click { selector, text } => {
                let el = self.resolve(selector, text.as_deref()).await?;
                self.page.click(&el.element).await?;
                Ok("Clicked element".into())
            }
            Command::Type { selector, value } => {
                let el = self.resolve(selector, None).await?;
                self.page.type_text(&el.element, value).await?;
                Ok("Entered text".into())
            }
            Command::SetValue { selector, value } => {
                let el = self.resolve(selector, None).await?;
                self.page.set_value(&el.element, value).await?;
                Ok("Value set".into())
            }
            Command::Focus { selector } => {
                let el = self.resolve(selector, None).await?;
                self.page.focus(&el.element).await?;
                Ok("Focused element".into())
            }
            Command::Enable { selector } => {
                let el = self.resolve(selector, None).await?;
                self.page.enable(&el.element).await?;
                Ok("Element enabled".into())
            }
            Command::Hover { selector } => {
                let el = self.resolve(selector, None).await?;
                self.page.hover(&el.element).await?;
                Ok("Hovered element".into())
            }
            Command::Scroll { selector, x, y } => match (selector, x, y) {
                (Some(selector), _, _) => {
                    let el = self.resolve(selector, None).await?;
                    self.page.scroll_into_view(&el.element).await?;
                    Ok("Scrolled to element".into())
                }
                (None, Some(x), Some(y)) => {
                    self.page.scroll_to(*x, *y).await?;
                    Ok(format!("Scrolled to {}, {}", x, y).into())
                }
                _ => Err(ActionError::InvalidArguments(
                    "scroll needs a selector or both x and y".into(),
                )),
            },
            Command::GetAttr {
                selector,
                attribute,
            } => {
                let el = self.resolve(selector, None).await?;
                let value = self.page.attribute(&el.element, attribute).await?;
                Ok(value.map(Value::String).unwrap_or(Value::Null))
            }
            Command::GetStyle { selector, property } => {
                let el = self.resolve(selector, None).await?;
                Ok(self.page.computed_style(&el.element, property).await?.into())
            }
            Command::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(format!("Waited {}ms", ms).into())
            }
            Command::WaitForElement {
                selector,
                timeout_ms,
            } => self.wait_for_element(selector, *timeout_ms).await,
            Command::WaitFor {
                condition: WaitCondition::Quiet,
                timeout_ms,
            } => {
                let quiet = timeout_ms.unwrap_or(self.config.default_quiet_ms);
                self.observer.wait_for_quiet(quiet).await;
                Ok("Page is quiet".into())
            }
            Command::WaitFor {
                condition: WaitCondition::Network,
                timeout_ms,
            } => {
                let limit = timeout_ms.unwrap_or(self.config.network_idle_timeout_ms);
                match self.page.wait_for_network_idle(limit).await {
                    Ok(true) => Ok("Network idle".into()),
                    Ok(false) | Err(BackendError::Timeout(_)) => {
                        Ok("Timeout: network did not go idle".into())
                    }
                    Err(e) if e.is_not_supported() => {
                        debug!("Network idle unavailable, waiting for page quiet");
                        self.observer
                            .wait_for_quiet(self.config.default_quiet_ms)
                            .await;
                        Ok("Page is quiet".into())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Command::Exec { script } => Ok(self.page.execute_script(script).await?),
            Command::Screenshot => self.screenshot().await,
            Command::Dialog {
                action,
                prompt_text,
            } => {
                self.page
                    .handle_dialogs(DialogPolicy {
                        action: *action,
                        prompt_text: prompt_text.clone(),
                    })
                    .await?;
                Ok(match action {
                    DialogAction::Accept => "Dialogs will be accepted",
                    DialogAction::Dismiss => "Dialogs will be dismissed",
                }
                .into())
            }
            Command::Resize { width, height } => {
                self.page.resize(*width, *height).await?;
                Ok(format!("Resized to {}x{}", width, height).into())
            }
            Command::Changes { action } => match action {
                ChangesAction::On => {
                    self.observer.start();
                    Ok("Observer started".into())
                }
                ChangesAction::Off => {
                    self.observer.stop();
                    Ok("Observer stopped".into())
                }
                ChangesAction::Clear => {
                    self.observer.clear();
                    Ok("Observer cleared".into())
                }
                ChangesAction::Request => Ok(serde_json::to_value(self.observer.request())?),
            },
            Command::Record { action } => match action {
                RecordAction::Start => {
                    self.observer.start();
                    Ok("Recording started".into())
                }
                RecordAction::Stop => {
                    self.observer.stop();
                    let actions: Vec<_> = self
                        .observer
                        .request()
                        .into_iter()
                        .filter(|e| e.is_user_action())
                        .collect();
                    Ok(serde_json::to_value(actions)?)
                }
            },
            Command::Recipe { action, name } => match action {
                RecipeAction::Save => {
                    let recipe = self.recipes.save(name, self.observer.request()).await?;
                    Ok(format!("Recipe '{}' saved ({} events)", name, recipe.events.len()).into())
                }
                RecipeAction::Load => Ok(match self.recipes.load(name).await? {
                    Some(recipe) => json!({
                        "found": true,
                        "name": recipe.name,
                        "events": recipe.events.len(),
                    }),
                    None => json!({ "found": false, "name": name }),
                }),
            },
            Command::Message { text } => match self.page.show_message(text).await {
                Ok(()) => Ok("Message shown".into()),
                Err(e) if e.is_not_supported() => {
                    info!(message = %text, "Message");
                    Ok("Message shown".into())
                }
                Err(e) => Err(e.into()),
            },
            Command::ShowToast { message } => Ok(self
                .bridge
                .request(message, ToastOptions::default())
                .await?
                .into()),
            Command::Assert { selector, text } => {
                let elements = self.page.query_all(selector).await?;
                if elements.is_empty() {
                    return Err(ActionError::ElementNotFound(selector.clone()));
                }
                match text {
                    Some(expected) if select_element(&elements, Some(expected)).is_none() => {
                        Err(ActionError::Assertion(format!(
                            "no element matching {} has text \"{}\"",
                            selector, expected
                        )))
                    }
                    _ => Ok("Assertion passed".into()),
                }
            }
            Command::AssertTextContains { selector, text } => {
                let el = self.resolve(selector, None).await?;
                if el.text.contains(text.as_str()) {
                    Ok("Assertion passed".into())
                } else {
                    Err(ActionError::Assertion(format!(
                        "text of {} did not contain \"{}\"",
                        selector, text
                    )))
                }
            }
            Command::Break => Ok("break".into()),
        }
    }

    async fn resolve(&self, selector: &str, text: Option<&str>) -> Result<ElementInfo, ActionError> {
        let elements = self.page.query_all(selector).await?;
        select_element(&elements, text)
            .cloned()
            .ok_or_else(|| match text {
                Some(t) => ActionError::ElementNotFound(format!("{} with text \"{}\"", selector, t)),
                None => ActionError::ElementNotFound(selector.to_string()),
            })
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        timeout_ms: Option<u64>,
    ) -> Result<Value, ActionError> {
        let timeout =
            Duration::from_millis(timeout_ms.unwrap_or(self.config.wait_for_element_timeout_ms));
        let poll = Duration::from_millis(self.config.element_poll_interval_ms.max(1));
        // Subscribe before the first check so no mutation slips between the two.
        let mut changes = self.observer.dom_changes();
        let deadline = Instant::now() + timeout;

        loop {
            if !self.page.query_all(selector).await?.is_empty() {
                return Ok("Element appeared".into());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(format!("Timeout: element {} did not appear", selector).into());
            }
            let tick = poll.min(deadline - now);
            tokio::select! {
                _ = changes.recv() => {}
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    async fn screenshot(&self) -> Result<Value, ActionError> {
        let bytes = self.page.screenshot().await?;
        match &self.config.screenshot_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path: PathBuf = dir.join(format!("screenshot-{}.png", now_millis()));
                tokio::fs::write(&path, &bytes).await?;
                Ok(path.display().to_string().into())
            }
            None => Ok(format!("Screenshot captured ({} bytes)", bytes.len()).into()),
        }
    }
}

/// The first element, or the first whose trimmed text equals `text` exactly.
pub fn select_element<'a>(elements: &'a [ElementInfo], text: Option<&str>) -> Option<&'a ElementInfo> {
    match text {
        Some(t) => elements.iter().find(|e| e.text.trim() == t),
        None => elements.first(),
    }
}

/// Absolute URL for a navigation target; bare hosts get `https://`.
pub fn normalize_url(raw: &str) -> Result<String, ActionError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://")
        || ["about:", "data:", "file:"]
            .iter()
            .any(|scheme| raw.starts_with(scheme))
    {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&candidate)
        .map(|u| u.to_string())
        .map_err(|e| ActionError::InvalidUrl(format!("{}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepper_common::protocol::ElementRef;

    fn el(id: &str, text: &str) -> ElementInfo {
        ElementInfo {
            element: ElementRef(id.into()),
            tag: "button".into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_select_element_by_trimmed_text() {
        let elements = vec![el("a", "Cancel"), el("b", "  Save \n"), el("c", "Save")];
        assert_eq!(select_element(&elements, None).unwrap().element.0, "a");
        assert_eq!(select_element(&elements, Some("Save")).unwrap().element.0, "b");
        assert!(select_element(&elements, Some("save")).is_none());
        assert!(select_element(&[], None).is_none());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(
            normalize_url("http://localhost:8080/a?b=1").unwrap(),
            "http://localhost:8080/a?b=1"
        );
        assert_eq!(normalize_url("about:blank").unwrap(), "about:blank");
        assert!(normalize_url("http://").is_err());
    }

    #[test]
    fn test_only_pause_errors_halt() {
        assert!(
            ActionError::Bridge(BridgeError::Cancelled {
                toast_id: "t".into()
            })
            .is_halt()
        );
        assert!(!ActionError::Bridge(BridgeError::Closed).is_halt());
        assert!(!ActionError::ElementNotFound("#x".into()).is_halt());
    }
}
