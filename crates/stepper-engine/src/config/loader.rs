use super::schema::StepperConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "STEPPER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// `$STEPPER_CONFIG` if set (it must exist), else the first of
    /// [`ConfigLoader::search_paths`] that exists, else defaults.
    pub async fn load_default() -> Result<StepperConfig, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)).await,
            None => Self::load_first(&Self::search_paths()).await,
        }
    }

    /// `./stepper.yaml`, then `~/.stepper/config.yaml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./stepper.yaml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".stepper").join("config.yaml"));
        }
        paths
    }

    pub async fn load_first(candidates: &[PathBuf]) -> Result<StepperConfig, ConfigError> {
        for path in candidates {
            if path.exists() {
                return Self::load_from(path).await;
            }
        }
        debug!("No config file found, using defaults");
        Ok(StepperConfig::default())
    }

    /// An empty file means all defaults.
    pub async fn load_from(path: &Path) -> Result<StepperConfig, ConfigError> {
        debug!(path = %path.display(), "Loading config");
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(StepperConfig::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }
}
