use super::error::{create_dir_error, StateError};
use crate::shared::ids::validate_identifier_value;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_STATE_ROOT_DIR: &str = ".codex-subagent";
pub const STATE_ROOT_ENV: &str = "CODEX_SUBAGENT_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    pub root: PathBuf,
}

impl PathLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn launch_errors_dir(&self) -> PathBuf {
        self.state_dir().join("launch-errors")
    }

    pub fn threads_file(&self) -> PathBuf {
        self.state_dir().join("threads.json")
    }

    pub fn launches_file(&self) -> PathBuf {
        self.state_dir().join("launches.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn thread_log_path(&self, thread_id: &str) -> Result<PathBuf, StateError> {
        checked_id("thread id", thread_id)?;
        Ok(self.logs_dir().join(format!("{thread_id}.ndjson")))
    }

    pub fn thread_archive_dir(&self, thread_id: &str) -> Result<PathBuf, StateError> {
        checked_id("thread id", thread_id)?;
        Ok(self.archive_dir().join(thread_id))
    }

    pub fn archive_metadata_path(&self, thread_id: &str) -> Result<PathBuf, StateError> {
        Ok(self.thread_archive_dir(thread_id)?.join("metadata.json"))
    }

    pub fn launch_error_log_path(&self, launch_id: &str) -> Result<PathBuf, StateError> {
        checked_id("launch id", launch_id)?;
        Ok(self.launch_errors_dir().join(format!("{launch_id}.log")))
    }

    pub fn launch_stderr_path(&self, launch_id: &str) -> Result<PathBuf, StateError> {
        checked_id("launch id", launch_id)?;
        Ok(self.launch_errors_dir().join(format!("{launch_id}.stderr")))
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.state_dir(),
            self.logs_dir(),
            self.archive_dir(),
            self.launch_errors_dir(),
        ]
    }

    pub fn ensure(&self) -> Result<(), StateError> {
        for path in self.required_directories() {
            fs::create_dir_all(&path).map_err(|source| create_dir_error(&path, source))?;
        }
        Ok(())
    }
}

pub fn default_state_root_path() -> Result<PathBuf, StateError> {
    if let Some(explicit) = std::env::var_os(STATE_ROOT_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(explicit));
    }
    let home = std::env::var_os("HOME").ok_or(StateError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub(crate) fn checked_id(kind: &'static str, value: &str) -> Result<(), StateError> {
    validate_identifier_value(kind, value).map_err(|reason| StateError::InvalidId {
        kind,
        value: value.to_string(),
        reason,
    })
}
