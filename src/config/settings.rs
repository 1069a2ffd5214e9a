use super::ConfigError;
use crate::backend::BackendKind;
use crate::ownership::{DEFAULT_CONTROLLER_PATTERN, DEFAULT_MAX_ANCESTRY_DEPTH};
use crate::state::{LockOptions, PathLayout, DEFAULT_STALE_LAUNCH_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_lock_retry_ms() -> u64 {
    25
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_stale_launch_ms() -> u64 {
    DEFAULT_STALE_LAUNCH_THRESHOLD.as_millis() as u64
}

fn default_launch_grace_ms() -> u64 {
    400
}

fn default_controller_pattern() -> String {
    DEFAULT_CONTROLLER_PATTERN.to_string()
}

fn default_max_ancestry_depth() -> usize {
    DEFAULT_MAX_ANCESTRY_DEPTH
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stale_launch_ms")]
    pub stale_launch_ms: u64,
    #[serde(default = "default_launch_grace_ms")]
    pub launch_grace_ms: u64,
    #[serde(default = "default_controller_pattern")]
    pub controller_pattern: String,
    #[serde(default = "default_max_ancestry_depth")]
    pub max_ancestry_depth: usize,
    #[serde(default)]
    pub default_backend: BackendKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retry_ms: default_lock_retry_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stale_launch_ms: default_stale_launch_ms(),
            launch_grace_ms: default_launch_grace_ms(),
            controller_pattern: default_controller_pattern(),
            max_ancestry_depth: default_max_ancestry_depth(),
            default_backend: BackendKind::default(),
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(layout: &PathLayout) -> Result<Self, ConfigError> {
        let settings = Self::from_path(&layout.config_file())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("lock_timeout_ms", self.lock_timeout_ms),
            ("lock_retry_ms", self.lock_retry_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("stale_launch_ms", self.stale_launch_ms),
            ("launch_grace_ms", self.launch_grace_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Settings(format!("`{name}` must be greater than 0")));
            }
        }
        if self.max_ancestry_depth == 0 {
            return Err(ConfigError::Settings(
                "`max_ancestry_depth` must be greater than 0".to_string(),
            ));
        }
        if self.controller_pattern.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`controller_pattern` must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_launch_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_launch_ms)
    }

    pub fn launch_grace(&self) -> Duration {
        Duration::from_millis(self.launch_grace_ms)
    }
}
