use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Form-like elements whose value changes count as page activity.
const FORM_TAGS: &[&str] = &["input", "select", "textarea", "option"];

/// Attributes whose mutation on a form-like element is retained.
const SIGNIFICANT_ATTRIBUTES: &[&str] = &["value", "checked", "selected"];

/// A single observed page event.
///
/// Serializes as `{ "type": ..., "details": ..., "timestamp": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverEvent {
    #[serde(flatten)]
    pub details: EventDetails,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "camelCase")]
pub enum EventDetails {
    Dom(DomMutation),
    Location(String),
    /// Window focus (`true`) or blur (`false`).
    Focus(bool),
    ElementFocus(ElementSummary),
    Keydown(KeyInfo),
    Click(ClickInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomMutation {
    pub mutation: MutationKind,
    /// Simple selector of the mutated node.
    pub target: String,
    /// Lowercase tag name of the mutated node.
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub selector: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub alt_key: bool,
    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub meta_key: bool,
    #[serde(default)]
    pub shift_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickInfo {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub button: u16,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ObserverEvent {
    pub fn new(details: EventDetails, timestamp: u64) -> Self {
        Self { details, timestamp }
    }

    /// Builds an event stamped with the current wall-clock time.
    pub fn now(details: EventDetails) -> Self {
        Self::new(details, now_millis())
    }

    /// The `type` tag of the event.
    pub fn kind(&self) -> &'static str {
        match self.details {
            EventDetails::Dom(_) => "dom",
            EventDetails::Location(_) => "location",
            EventDetails::Focus(_) => "focus",
            EventDetails::ElementFocus(_) => "elementFocus",
            EventDetails::Keydown(_) => "keydown",
            EventDetails::Click(_) => "click",
        }
    }

    /// Whether the event is retained in the observer buffer.
    ///
    /// Everything except DOM churn is significant. DOM mutations only count
    /// when they change the value, checked or selected state of a form-like
    /// element.
    pub fn is_significant(&self) -> bool {
        match &self.details {
            EventDetails::Dom(m) => {
                m.mutation == MutationKind::Attributes
                    && FORM_TAGS.contains(&m.tag.to_ascii_lowercase().as_str())
                    && m.attribute
                        .as_deref()
                        .is_some_and(|a| SIGNIFICANT_ATTRIBUTES.contains(&a))
            }
            _ => true,
        }
    }

    /// Clicks, key presses and element focus changes made by the user.
    pub fn is_user_action(&self) -> bool {
        matches!(
            self.details,
            EventDetails::Click(_) | EventDetails::Keydown(_) | EventDetails::ElementFocus(_)
        )
    }

    pub fn is_dom(&self) -> bool {
        matches!(self.details, EventDetails::Dom(_))
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attr_change(tag: &str, attribute: &str) -> ObserverEvent {
        ObserverEvent::new(
            EventDetails::Dom(DomMutation {
                mutation: MutationKind::Attributes,
                target: format!("{}#x", tag),
                tag: tag.into(),
                attribute: Some(attribute.into()),
            }),
            1,
        )
    }

    #[test]
    fn test_significance_filter() {
        assert!(attr_change("input", "value").is_significant());
        assert!(attr_change("option", "selected").is_significant());
        assert!(!attr_change("div", "value").is_significant());
        assert!(!attr_change("input", "class").is_significant());

        let child_list = ObserverEvent::new(
            EventDetails::Dom(DomMutation {
                mutation: MutationKind::ChildList,
                target: "ul".into(),
                tag: "ul".into(),
                attribute: None,
            }),
            1,
        );
        assert!(!child_list.is_significant());
        assert!(ObserverEvent::new(EventDetails::Focus(true), 1).is_significant());
    }

    #[test]
    fn test_wire_shape() {
        let event = ObserverEvent::new(EventDetails::Location("https://a.test/".into()), 42);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "location", "details": "https://a.test/", "timestamp": 42})
        );

        let back: ObserverEvent = serde_json::from_value(json!({
            "type": "keydown",
            "details": {"key": "Enter"},
            "timestamp": 7
        }))
        .unwrap();
        assert_eq!(back.kind(), "keydown");
        assert!(back.is_user_action());
    }
}
