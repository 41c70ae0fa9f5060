pub mod backend;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod interpreter;
pub mod log;
pub mod observer;
pub mod recipe;

pub use backend::{BackendError, Page};
pub use bridge::{BridgeError, BroadcastChannel, PauseBridge};
pub use interpreter::{ActionError, Interpreter, RunOutput, RunReport, RunState};
pub use log::{ExecutionLogEntry, JsonlLogSink, LogSink, MemoryLogSink, StepResult, TracingLogSink};
pub use observer::ActivityObserver;
pub use recipe::{FileStore, KeyValueStore, MemoryStore, RecipeStore, RecordedRecipe};
pub use stepper_common::protocol;
