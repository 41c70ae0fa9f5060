use crate::observer::ActivityObserver;
use async_trait::async_trait;
pub use stepper_common::BackendError;
use stepper_common::protocol::{DialogPolicy, ElementInfo, ElementRef};
use std::sync::Arc;

/// The live document the interpreter drives.
///
/// Implementations are shared behind `Arc<dyn Page>` between the
/// interpreter and anything that pushes events into the observer, so every
/// method takes `&self`.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to an absolute URL.
    async fn navigate(&self, url: &str) -> Result<(), BackendError>;

    /// All elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>, BackendError>;

    async fn click(&self, element: &ElementRef) -> Result<(), BackendError>;

    /// Type `value` into the element as keystrokes.
    async fn type_text(&self, element: &ElementRef, value: &str) -> Result<(), BackendError>;

    /// Attach the page-side listeners that feed `observer`.
    async fn install_listeners(&self, observer: Arc<ActivityObserver>)
    -> Result<(), BackendError>;

    /// Assign the value property directly and fire input/change events.
    async fn set_value(&self, _element: &ElementRef, _value: &str) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("set_value".into()))
    }

    async fn focus(&self, _element: &ElementRef) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("focus".into()))
    }

    /// Remove the `disabled` state from the element.
    async fn enable(&self, _element: &ElementRef) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("enable".into()))
    }

    async fn hover(&self, _element: &ElementRef) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("hover".into()))
    }

    async fn scroll_into_view(&self, _element: &ElementRef) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("scroll_into_view".into()))
    }

    async fn scroll_to(&self, _x: i64, _y: i64) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("scroll_to".into()))
    }

    async fn attribute(
        &self,
        _element: &ElementRef,
        _name: &str,
    ) -> Result<Option<String>, BackendError> {
        Err(BackendError::NotSupported("attribute".into()))
    }

    async fn computed_style(
        &self,
        _element: &ElementRef,
        _property: &str,
    ) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("computed_style".into()))
    }

    /// Evaluate a script in the page and return its JSON result.
    async fn execute_script(&self, _script: &str) -> Result<serde_json::Value, BackendError> {
        Err(BackendError::NotSupported("execute_script".into()))
    }

    /// Capture the current viewport as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotSupported("screenshot".into()))
    }

    async fn handle_dialogs(&self, _policy: DialogPolicy) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("handle_dialogs".into()))
    }

    async fn resize(&self, _width: u32, _height: u32) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("resize".into()))
    }

    /// Show a transient, non-blocking notice to the operator.
    async fn show_message(&self, _text: &str) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("show_message".into()))
    }

    /// Resolve `true` once no requests are in flight, `false` on timeout.
    async fn wait_for_network_idle(&self, _timeout_ms: u64) -> Result<bool, BackendError> {
        Err(BackendError::NotSupported("wait_for_network_idle".into()))
    }
}
