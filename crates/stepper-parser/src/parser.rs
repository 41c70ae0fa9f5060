use crate::grammar::{fill, rule_for, FillError};
use crate::normalizer::{is_blank_or_comment, normalize, verb_of};
use stepper_common::{Command, CommandInput};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command verb '{0}'")]
    UnknownVerb(String),
    #[error("Malformed '{verb}' command: {input}")]
    Malformed { verb: String, input: String },
    #[error("Invalid number '{value}' in '{verb}' command")]
    InvalidNumber { verb: String, value: String },
    #[error("Command '{verb}' does not fit its record: {reason}")]
    Template { verb: String, reason: String },
    #[error("Invalid structured command: {0}")]
    Structured(String),
}

/// A parse failure inside a multi-line script.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {source}")]
pub struct ScriptError {
    pub line: usize,
    #[source]
    pub source: ParseError,
}

/// Parse one line of command text into a structured command.
pub fn parse(input: &str) -> Result<Command, ParseError> {
    let normalized = normalize(input);
    if normalized.is_empty() {
        return Err(ParseError::Empty);
    }

    let verb = verb_of(&normalized);
    let rule = rule_for(verb).ok_or_else(|| ParseError::UnknownVerb(verb.to_string()))?;

    let caps = rule
        .pattern
        .captures(&normalized)
        .ok_or_else(|| ParseError::Malformed {
            verb: verb.to_string(),
            input: input.trim().to_string(),
        })?;

    let record = fill(&rule.template, &caps).map_err(|e| match e {
        FillError::BadNumber(value) => ParseError::InvalidNumber {
            verb: verb.to_string(),
            value,
        },
    })?;

    serde_json::from_value(record).map_err(|e| ParseError::Template {
        verb: verb.to_string(),
        reason: e.to_string(),
    })
}

/// Parse text or pass an already-structured command through unchanged.
pub fn parse_input(input: CommandInput) -> Result<Command, ParseError> {
    match input {
        CommandInput::Text(text) => parse(&text),
        CommandInput::Structured(cmd) => Ok(cmd),
    }
}

/// Parse a JSON value that is either a command string or a command record.
pub fn parse_value(value: serde_json::Value) -> Result<Command, ParseError> {
    let input: CommandInput =
        serde_json::from_value(value).map_err(|e| ParseError::Structured(e.to_string()))?;
    parse_input(input)
}

/// Parse a script, one command per line. Blank lines and `#` comments are skipped.
pub fn parse_script(script: &str) -> Result<Vec<Command>, ScriptError> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| !is_blank_or_comment(line))
        .map(|(idx, line)| {
            parse(line).map_err(|source| ScriptError {
                line: idx + 1,
                source,
            })
        })
        .collect()
}
