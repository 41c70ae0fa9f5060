use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// One structured instruction of the automation language.
///
/// The set of kinds is closed: structured input with an unknown `kind` fails
/// to deserialize and never reaches the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Command {
    // Navigation
    Navto {
        url: String,
    },

    // Element actions
    Click {
        selector: String,
        #[serde(default)]
        text: Option<String>,
    },
    Type {
        selector: String,
        value: String,
    },
    SetValue {
        selector: String,
        value: String,
    },
    Focus {
        selector: String,
    },
    Enable {
        selector: String,
    },
    Hover {
        selector: String,
    },
    Scroll {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        x: Option<i64>,
        #[serde(default)]
        y: Option<i64>,
    },

    // Reads
    GetAttr {
        selector: String,
        attribute: String,
    },
    GetStyle {
        selector: String,
        property: String,
    },

    // Waits
    Wait {
        ms: u64,
    },
    WaitForElement {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    WaitFor {
        condition: WaitCondition,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    // Page level
    Exec {
        script: String,
    },
    Screenshot,
    Dialog {
        action: DialogAction,
        #[serde(default)]
        prompt_text: Option<String>,
    },
    Resize {
        width: u32,
        height: u32,
    },

    // Observer and recording
    Changes {
        action: ChangesAction,
    },
    Record {
        action: RecordAction,
    },
    Recipe {
        action: RecipeAction,
        name: String,
    },

    // Operator interaction
    Message {
        text: String,
    },
    ShowToast {
        message: String,
    },
    Assert {
        selector: String,
        #[serde(default)]
        text: Option<String>,
    },
    AssertTextContains {
        selector: String,
        text: String,
    },

    // Flow
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    Quiet,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogAction {
    Accept,
    Dismiss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesAction {
    On,
    Off,
    Clear,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeAction {
    Save,
    Load,
}

impl Command {
    /// The serialized `kind` tag of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Navto { .. } => "navto",
            Command::Click { .. } => "click",
            Command::Type { .. } => "type",
            Command::SetValue { .. } => "setvalue",
            Command::Focus { .. } => "focus",
            Command::Enable { .. } => "enable",
            Command::Hover { .. } => "hover",
            Command::Scroll { .. } => "scroll",
            Command::GetAttr { .. } => "getattr",
            Command::GetStyle { .. } => "getstyle",
            Command::Wait { .. } => "wait",
            Command::WaitForElement { .. } => "waitforelement",
            Command::WaitFor { .. } => "waitfor",
            Command::Exec { .. } => "exec",
            Command::Screenshot => "screenshot",
            Command::Dialog { .. } => "dialog",
            Command::Resize { .. } => "resize",
            Command::Changes { .. } => "changes",
            Command::Record { .. } => "record",
            Command::Recipe { .. } => "recipe",
            Command::Message { .. } => "message",
            Command::ShowToast { .. } => "showtoast",
            Command::Assert { .. } => "assert",
            Command::AssertTextContains { .. } => "asserttextcontains",
            Command::Break => "break",
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Command::Break)
    }
}

/// Input accepted by the grammar: free text or an already-structured command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    Text(String),
    Structured(Command),
}

impl From<&str> for CommandInput {
    fn from(s: &str) -> Self {
        CommandInput::Text(s.to_string())
    }
}

impl From<String> for CommandInput {
    fn from(s: String) -> Self {
        CommandInput::Text(s)
    }
}

impl From<Command> for CommandInput {
    fn from(cmd: Command) -> Self {
        CommandInput::Structured(cmd)
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}

/// Selectors with whitespace need quotes to stay one argument.
fn sel(s: &str) -> Cow<'_, str> {
    if s.is_empty() || s.contains(char::is_whitespace) {
        Cow::Owned(quoted(s))
    } else {
        Cow::Borrowed(s)
    }
}

fn lower<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Renders the command in its canonical text form.
///
/// The text form has no escapes: a quoted argument that itself contains `"`
/// does not parse back. The structured record is the lossless form.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Command::Navto { url } => write!(f, "{} {}", kind, url),
            Command::Click { selector, text } | Command::Assert { selector, text } => {
                write!(f, "{} {}", kind, sel(selector))?;
                if let Some(t) = text {
                    write!(f, " {}", quoted(t))?;
                }
                Ok(())
            }
            Command::Type { selector, value } | Command::SetValue { selector, value } => {
                write!(f, "{} {} {}", kind, sel(selector), quoted(value))
            }
            Command::Focus { selector }
            | Command::Enable { selector }
            | Command::Hover { selector } => write!(f, "{} {}", kind, sel(selector)),
            Command::AssertTextContains { selector, text } => {
                write!(f, "{} {} {}", kind, sel(selector), quoted(text))
            }
            Command::Scroll { selector, x, y } => match (selector, x, y) {
                (Some(selector), _, _) => write!(f, "{} {}", kind, sel(selector)),
                (None, Some(x), Some(y)) => write!(f, "{} {} {}", kind, x, y),
                _ => write!(f, "{}", kind),
            },
            Command::GetAttr {
                selector,
                attribute,
            } => write!(f, "{} {} {}", kind, sel(selector), attribute),
            Command::GetStyle { selector, property } => {
                write!(f, "{} {} {}", kind, sel(selector), property)
            }
            Command::Wait { ms } => write!(f, "{} {}", kind, ms),
            Command::WaitForElement {
                selector,
                timeout_ms,
            } => {
                write!(f, "{} {}", kind, sel(selector))?;
                if let Some(ms) = timeout_ms {
                    write!(f, " {}", ms)?;
                }
                Ok(())
            }
            Command::WaitFor {
                condition,
                timeout_ms,
            } => {
                write!(f, "{} {}", kind, lower(condition))?;
                if let Some(ms) = timeout_ms {
                    write!(f, " {}", ms)?;
                }
                Ok(())
            }
            Command::Exec { script } => write!(f, "{} {}", kind, quoted(script)),
            Command::Dialog {
                action,
                prompt_text,
            } => {
                write!(f, "{} {}", kind, lower(action))?;
                if let Some(t) = prompt_text {
                    write!(f, " {}", quoted(t))?;
                }
                Ok(())
            }
            Command::Resize { width, height } => write!(f, "{} {} {}", kind, width, height),
            Command::Changes { action } => write!(f, "{} {}", kind, lower(action)),
            Command::Record { action } => write!(f, "{} {}", kind, lower(action)),
            Command::Recipe { action, name } => {
                write!(f, "{} {} {}", kind, lower(action), quoted(name))
            }
            Command::Message { text } => write!(f, "{} {}", kind, quoted(text)),
            Command::ShowToast { message } => write!(f, "{} {}", kind, quoted(message)),
            Command::Screenshot | Command::Break => write!(f, "{}", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_tag_matches_serialization() {
        let cmd = Command::Type {
            selector: "#field".into(),
            value: "hello".into(),
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({"kind": "type", "selector": "#field", "value": "hello"})
        );
        assert_eq!(value["kind"], cmd.kind());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let res: Result<Command, _> = serde_json::from_value(json!({"kind": "fooverb"}));
        assert!(res.is_err());
    }

    #[test]
    fn test_display_renders_text_form() {
        let cmd = Command::Recipe {
            action: RecipeAction::Save,
            name: "login flow".into(),
        };
        assert_eq!(cmd.to_string(), "recipe save \"login flow\"");
        assert_eq!(Command::Break.to_string(), "break");
    }

    #[test]
    fn test_display_quotes_selectors_with_spaces() {
        let cmd = Command::Click {
            selector: "div a".into(),
            text: None,
        };
        assert_eq!(cmd.to_string(), "click \"div a\"");
        let cmd = Command::Hover {
            selector: "#menu".into(),
        };
        assert_eq!(cmd.to_string(), "hover #menu");
    }
}
