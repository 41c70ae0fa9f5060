use crate::command::DialogAction;
use crate::event::ObserverEvent;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================
// Interactive toast messages (cross-context broadcast channel)
// ============================================================

/// Messages exchanged between the interpreter and a presentation surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    ShowInteractiveToastRequest(ToastRequest),
    InteractiveToastResponse(ToastResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastRequest {
    pub toast_id: String,
    pub message: String,
    #[serde(default)]
    pub options: ToastOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastOptions {
    pub continue_label: String,
    pub cancel_label: String,
}

impl Default for ToastOptions {
    fn default() -> Self {
        Self {
            continue_label: "Continue".to_string(),
            cancel_label: "Cancel".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastResponse {
    pub toast_id: String,
    pub action: ToastAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastAction {
    Continue,
    Cancel,
    /// Any action other than continue/cancel; treated as a cancellation.
    Other,
}

impl<'de> Deserialize<'de> for ToastAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let action = String::deserialize(deserializer)?;
        Ok(match action.as_str() {
            "continue" => ToastAction::Continue,
            "cancel" => ToastAction::Cancel,
            _ => ToastAction::Other,
        })
    }
}

// ============================================================
// Page requests (remote page wire protocol)
// ============================================================

/// Opaque handle to an element in the live document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

/// An element matched by a selector query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub element: ElementRef,
    #[serde(default)]
    pub tag: String,
    /// Raw text content; callers trim before comparing.
    #[serde(default)]
    pub text: String,
}

/// How modal dialogs (alert/confirm/prompt) are auto-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogPolicy {
    pub action: DialogAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageRequest {
    Navigate { url: String },
    QueryAll { selector: String },
    Click { element: ElementRef },
    TypeText { element: ElementRef, value: String },
    SetValue { element: ElementRef, value: String },
    Focus { element: ElementRef },
    Enable { element: ElementRef },
    Hover { element: ElementRef },
    ScrollIntoView { element: ElementRef },
    ScrollTo { x: i64, y: i64 },
    Attribute { element: ElementRef, name: String },
    ComputedStyle { element: ElementRef, property: String },
    Execute { script: String },
    Screenshot,
    HandleDialogs { policy: DialogPolicy },
    Resize { width: u32, height: u32 },
    ShowMessage { text: String },
    NetworkIdle { timeout_ms: u64 },
    InstallListeners,
}

/// Everything carried over the extension socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    PageRequest {
        id: u64,
        request: PageRequest,
    },
    PageResponse {
        id: u64,
        ok: bool,
        #[serde(default)]
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ObserverEvent {
        event: ObserverEvent,
    },
    ShowInteractiveToastRequest(ToastRequest),
    InteractiveToastResponse(ToastResponse),
}

impl From<BridgeMessage> for WireMessage {
    fn from(msg: BridgeMessage) -> Self {
        match msg {
            BridgeMessage::ShowInteractiveToastRequest(req) => {
                WireMessage::ShowInteractiveToastRequest(req)
            }
            BridgeMessage::InteractiveToastResponse(resp) => {
                WireMessage::InteractiveToastResponse(resp)
            }
        }
    }
}
