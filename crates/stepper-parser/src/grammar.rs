//! The command grammar as data.
//!
//! Each verb owns exactly one pattern and one template. Patterns are matched
//! against the whole normalized line. Templates are JSON skeletons of the
//! structured command: a string `"$n"` is replaced by capture group `n`
//! (surrounding quotes stripped), a string `"#n"` by capture group `n` read as
//! an integer. Optional groups that did not participate become `null`.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{json, Value};

/// A selector: either a bare token or a double-quoted string.
const SEL: &str = r#"("[^"]+"|\S+)"#;
/// A double-quoted string, possibly empty.
const STR: &str = r#"("[^"]*")"#;

pub struct GrammarRule {
    pub verb: &'static str,
    pub pattern: Regex,
    pub template: Value,
}

impl GrammarRule {
    fn new(verb: &'static str, pattern: &str, template: Value) -> Self {
        let full = format!("^{}$", pattern.replace("{SEL}", SEL).replace("{STR}", STR));
        Self {
            verb,
            // Patterns are static; a bad one is a programming error caught by the tests.
            pattern: Regex::new(&full).unwrap_or_else(|e| panic!("grammar rule {verb}: {e}")),
            template,
        }
    }
}

lazy_static! {
    static ref GRAMMAR: Vec<GrammarRule> = vec![
        GrammarRule::new("navto", r"navto\s+(\S+)", json!({"kind": "navto", "url": "$1"})),
        GrammarRule::new(
            "click",
            r"click\s+{SEL}(?:\s+{STR})?",
            json!({"kind": "click", "selector": "$1", "text": "$2"}),
        ),
        GrammarRule::new(
            "type",
            r"type\s+{SEL}\s+{STR}",
            json!({"kind": "type", "selector": "$1", "value": "$2"}),
        ),
        GrammarRule::new(
            "setvalue",
            r"setvalue\s+{SEL}\s+{STR}",
            json!({"kind": "setvalue", "selector": "$1", "value": "$2"}),
        ),
        GrammarRule::new("focus", r"focus\s+{SEL}", json!({"kind": "focus", "selector": "$1"})),
        GrammarRule::new("enable", r"enable\s+{SEL}", json!({"kind": "enable", "selector": "$1"})),
        GrammarRule::new("hover", r"hover\s+{SEL}", json!({"kind": "hover", "selector": "$1"})),
        GrammarRule::new(
            "scroll",
            r"scroll\s+(?:(-?\d+)\s+(-?\d+)|{SEL})",
            json!({"kind": "scroll", "x": "#1", "y": "#2", "selector": "$3"}),
        ),
        GrammarRule::new(
            "getattr",
            r"getattr\s+{SEL}\s+([\w:-]+)",
            json!({"kind": "getattr", "selector": "$1", "attribute": "$2"}),
        ),
        GrammarRule::new(
            "getstyle",
            r"getstyle\s+{SEL}\s+([\w-]+)",
            json!({"kind": "getstyle", "selector": "$1", "property": "$2"}),
        ),
        GrammarRule::new("wait", r"wait\s+(\d+)", json!({"kind": "wait", "ms": "#1"})),
        GrammarRule::new(
            "waitforelement",
            r"waitforelement\s+{SEL}(?:\s+(\d+))?",
            json!({"kind": "waitforelement", "selector": "$1", "timeout_ms": "#2"}),
        ),
        GrammarRule::new(
            "waitfor",
            r"waitfor\s+(quiet|network)(?:\s+(\d+))?",
            json!({"kind": "waitfor", "condition": "$1", "timeout_ms": "#2"}),
        ),
        GrammarRule::new("exec", r"exec\s+(.+)", json!({"kind": "exec", "script": "$1"})),
        GrammarRule::new("screenshot", r"screenshot", json!({"kind": "screenshot"})),
        GrammarRule::new(
            "dialog",
            r"dialog\s+(accept|dismiss)(?:\s+{STR})?",
            json!({"kind": "dialog", "action": "$1", "prompt_text": "$2"}),
        ),
        GrammarRule::new(
            "resize",
            r"resize\s+(\d+)\s+(\d+)",
            json!({"kind": "resize", "width": "#1", "height": "#2"}),
        ),
        GrammarRule::new(
            "changes",
            r"changes\s+(on|off|clear|request)",
            json!({"kind": "changes", "action": "$1"}),
        ),
        GrammarRule::new(
            "record",
            r"record\s+(start|stop)",
            json!({"kind": "record", "action": "$1"}),
        ),
        GrammarRule::new(
            "recipe",
            r"recipe\s+(save|load)\s+{SEL}",
            json!({"kind": "recipe", "action": "$1", "name": "$2"}),
        ),
        GrammarRule::new("message", r"message\s+(.+)", json!({"kind": "message", "text": "$1"})),
        GrammarRule::new(
            "showtoast",
            r"showtoast\s+(.+)",
            json!({"kind": "showtoast", "message": "$1"}),
        ),
        GrammarRule::new(
            "assert",
            r"assert\s+{SEL}(?:\s+{STR})?",
            json!({"kind": "assert", "selector": "$1", "text": "$2"}),
        ),
        GrammarRule::new(
            "asserttextcontains",
            r"asserttextcontains\s+{SEL}\s+{STR}",
            json!({"kind": "asserttextcontains", "selector": "$1", "text": "$2"}),
        ),
        GrammarRule::new("break", r"break", json!({"kind": "break"})),
    ];
}

/// The full rule table, in declaration order.
pub fn grammar() -> &'static [GrammarRule] {
    &GRAMMAR
}

/// Looks up the rule owning `verb`.
pub fn rule_for(verb: &str) -> Option<&'static GrammarRule> {
    GRAMMAR.iter().find(|rule| rule.verb == verb)
}

#[derive(Debug)]
pub(crate) enum FillError {
    BadNumber(String),
}

/// Substitutes capture groups into a template.
pub(crate) fn fill(template: &Value, caps: &Captures<'_>) -> Result<Value, FillError> {
    match template {
        Value::String(s) => fill_placeholder(s, caps),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), fill(value, caps)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| fill(v, caps))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn fill_placeholder(s: &str, caps: &Captures<'_>) -> Result<Value, FillError> {
    if let Some(n) = s.strip_prefix('$').and_then(|i| i.parse::<usize>().ok()) {
        return Ok(caps
            .get(n)
            .map(|m| Value::String(strip_quotes(m.as_str()).to_string()))
            .unwrap_or(Value::Null));
    }

    if let Some(n) = s.strip_prefix('#').and_then(|i| i.parse::<usize>().ok()) {
        return match caps.get(n) {
            Some(m) => m
                .as_str()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| FillError::BadNumber(m.as_str().to_string())),
            None => Ok(Value::Null),
        };
    }

    Ok(Value::String(s.to_string()))
}

/// Removes one pair of matching surrounding quotes.
fn strip_quotes(text: &str) -> &str {
    for q in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_rule_compiles_and_is_unique() {
        let rules = grammar();
        assert!(!rules.is_empty());
        for rule in rules {
            assert_eq!(
                rules.iter().filter(|r| r.verb == rule.verb).count(),
                1,
                "duplicate verb {}",
                rule.verb
            );
            assert_eq!(rule.template["kind"], rule.verb);
        }
    }

    #[test]
    fn test_optional_group_becomes_null() {
        let rule = rule_for("click").unwrap();
        let caps = rule.pattern.captures("click #btn").unwrap();
        let filled = fill(&rule.template, &caps).unwrap();
        assert_eq!(filled["selector"], "#btn");
        assert!(filled["text"].is_null());
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"a b\""), "a b");
        assert_eq!(strip_quotes("'x'"), "x");
        assert_eq!(strip_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
