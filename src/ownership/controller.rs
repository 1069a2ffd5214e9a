use std::process::{Command, Stdio};

pub const CONTROLLER_ID_ENV: &str = "CODEX_SUBAGENT_CONTROLLER_ID";
pub const DEFAULT_CONTROLLER_PATTERN: &str = "codex";
pub const DEFAULT_MAX_ANCESTRY_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("process ancestry walk exceeded maximum depth of {max}")]
    MaxDepthExceeded { max: usize },
    #[error("failed to query process {pid}: {reason}")]
    ProcessQuery { pid: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_pid(pid: u32) -> Self {
        Self(pid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub command: String,
}

pub trait ProcessTable {
    fn lookup(&self, pid: u32) -> Result<Option<ProcessInfo>, ControllerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PsProcessTable;

impl ProcessTable for PsProcessTable {
    fn lookup(&self, pid: u32) -> Result<Option<ProcessInfo>, ControllerError> {
        let output = Command::new("ps")
            .arg("-o")
            .arg("ppid=")
            .arg("-o")
            .arg("command=")
            .arg("-p")
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|err| ControllerError::ProcessQuery {
                pid,
                reason: err.to_string(),
            })?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ps_line(pid, stdout.trim()))
    }
}

fn parse_ps_line(pid: u32, line: &str) -> Option<ProcessInfo> {
    let line = line.trim_start();
    if line.is_empty() {
        return None;
    }
    let (ppid, command) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    Some(ProcessInfo {
        pid,
        parent_pid: ppid.trim().parse::<u32>().ok().filter(|value| *value != 0),
        command: command.trim().to_string(),
    })
}

pub fn command_matches(command: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    command
        .split_whitespace()
        .take(2)
        .filter_map(|token| token.rsplit('/').next())
        .any(|name| name.to_ascii_lowercase() == pattern)
}

#[derive(Debug, Clone)]
pub struct ControllerIdentity<T> {
    table: T,
    pattern: String,
    max_depth: usize,
}

impl ControllerIdentity<PsProcessTable> {
    pub fn system() -> Self {
        Self::new(PsProcessTable)
    }
}

impl<T: ProcessTable> ControllerIdentity<T> {
    pub fn new(table: T) -> Self {
        Self {
            table,
            pattern: DEFAULT_CONTROLLER_PATTERN.to_string(),
            max_depth: DEFAULT_MAX_ANCESTRY_DEPTH,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    // The process itself is never a candidate; a broken chain falls back to `start_pid`.
    pub fn resolve(
        &self,
        override_value: Option<&str>,
        start_pid: u32,
    ) -> Result<ControllerId, ControllerError> {
        if let Some(explicit) = override_value.map(str::trim).filter(|value| !value.is_empty()) {
            return Ok(ControllerId::new(explicit));
        }

        let fallback = ControllerId::from_pid(start_pid);
        let mut pid = start_pid;
        for depth in 0..self.max_depth {
            let info = match self.table.lookup(pid) {
                Ok(Some(info)) => info,
                Ok(None) => return Ok(fallback),
                Err(err) => {
                    tracing::debug!(pid, error = %err, "process lookup failed; using own pid");
                    return Ok(fallback);
                }
            };
            if depth > 0 && command_matches(&info.command, &self.pattern) {
                return Ok(ControllerId::from_pid(info.pid));
            }
            match info.parent_pid {
                Some(parent) => pid = parent,
                None => return Ok(fallback),
            }
        }
        Err(ControllerError::MaxDepthExceeded {
            max: self.max_depth,
        })
    }

    pub fn resolve_or_fallback(
        &self,
        override_value: Option<&str>,
        start_pid: u32,
    ) -> ControllerId {
        self.resolve(override_value, start_pid).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "controller resolution failed; using own pid");
            ControllerId::from_pid(start_pid)
        })
    }
}
