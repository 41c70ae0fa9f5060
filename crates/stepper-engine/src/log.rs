use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use stepper_common::Command;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Outcome of one executed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Ok(Value),
    Error(String),
}

impl StepResult {
    pub fn ok(value: impl Into<Value>) -> Self {
        StepResult::Ok(value.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StepResult::Error(_))
    }

    /// The result as display text; strings are shown without quotes.
    pub fn as_text(&self) -> String {
        match self {
            StepResult::Ok(Value::String(s)) => s.clone(),
            StepResult::Ok(v) => v.to_string(),
            StepResult::Error(e) => format!("Error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub command: Command,
    pub result: StepResult,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write log: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for the execution log at the end of each run.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn flush(&self, entries: &[ExecutionLogEntry]) -> Result<(), SinkError>;
}

/// Emits one `tracing` record per entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn flush(&self, entries: &[ExecutionLogEntry]) -> Result<(), SinkError> {
        for (i, entry) in entries.iter().enumerate() {
            info!(
                step = i + 1,
                command = %entry.command,
                result = %entry.result.as_text(),
                "Execution log"
            );
        }
        Ok(())
    }
}

/// Keeps every flushed run in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    runs: Arc<Mutex<Vec<Vec<ExecutionLogEntry>>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<Vec<ExecutionLogEntry>> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn flush(&self, entries: &[ExecutionLogEntry]) -> Result<(), SinkError> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entries.to_vec());
        Ok(())
    }
}

/// Appends entries as JSON lines to a file.
#[derive(Debug, Clone)]
pub struct JsonlLogSink {
    path: PathBuf,
}

impl JsonlLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LogSink for JsonlLogSink {
    async fn flush(&self, entries: &[ExecutionLogEntry]) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}
