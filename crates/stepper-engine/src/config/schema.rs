use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepperConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    #[serde(default = "default_wait_for_element_timeout_ms")]
    pub wait_for_element_timeout_ms: u64,
    /// Re-check interval for `waitforelement` when no DOM change arrives.
    #[serde(default = "default_element_poll_interval_ms")]
    pub element_poll_interval_ms: u64,
    /// Quiet period used by `waitfor quiet` without an explicit duration.
    #[serde(default = "default_quiet_ms")]
    pub default_quiet_ms: u64,
    #[serde(default = "default_network_idle_timeout_ms")]
    pub network_idle_timeout_ms: u64,
    /// Halt the run on the first failing step instead of continuing.
    #[serde(default)]
    pub stop_on_error: bool,
    /// Where `screenshot` writes images. Without it the capture is only reported.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            wait_for_element_timeout_ms: default_wait_for_element_timeout_ms(),
            element_poll_interval_ms: default_element_poll_interval_ms(),
            default_quiet_ms: default_quiet_ms(),
            network_idle_timeout_ms: default_network_idle_timeout_ms(),
            stop_on_error: false,
            screenshot_dir: None,
        }
    }
}

fn default_wait_for_element_timeout_ms() -> u64 {
    5000
}

fn default_element_poll_interval_ms() -> u64 {
    250
}

fn default_quiet_ms() -> u64 {
    500
}

fn default_network_idle_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_dom_channel_capacity")]
    pub dom_channel_capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            dom_channel_capacity: default_dom_channel_capacity(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_dom_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Deadline for an interactive pause. `None` waits for an answer forever.
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// The store file: the configured path, else `<data dir>/stepper/store.json`.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".stepper"))
            .join("stepper")
            .join("store.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_port() -> u16 {
    9001
}

fn default_request_timeout_ms() -> u64 {
    30000
}
