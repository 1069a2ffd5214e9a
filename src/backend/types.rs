use crate::state::PermissionLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend `{0}`; expected one of: codex, claude")]
    UnknownBackend(String),
    #[error("invalid {backend} event: {reason}")]
    InvalidEvent { backend: BackendKind, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Codex,
    Claude,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BackendKind {
    type Error = BackendError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            other => Err(BackendError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub prompt: String,
    pub resume_thread_id: Option<String>,
    pub permission_level: PermissionLevel,
    pub model: Option<String>,
    pub profile: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl BackendOptions {
    pub fn new(prompt: impl Into<String>, permission_level: PermissionLevel) -> Self {
        Self {
            prompt: prompt.into(),
            resume_thread_id: None,
            permission_level,
            model: None,
            profile: None,
            working_dir: None,
        }
    }

    pub fn resuming(mut self, thread_id: impl Into<String>) -> Self {
        self.resume_thread_id = Some(thread_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    SessionStarted { thread_id: String },
    AssistantMessage { fingerprint: String, text: String },
    Completed { error: Option<String> },
    Other { kind: String },
}

pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn binary(&self) -> &str;

    fn build_args(&self, options: &BackendOptions) -> Vec<String>;

    fn parse_event(&self, raw: &str) -> Result<BackendEvent, BackendError>;

    fn format_error(&self, message: &str, stderr: &str, stdout: &str) -> String;
}

pub fn backend_for(kind: BackendKind) -> Box<dyn Backend> {
    match kind {
        BackendKind::Codex => Box::new(super::codex::CodexBackend::default()),
        BackendKind::Claude => Box::new(super::claude::ClaudeBackend::default()),
    }
}

const OUTPUT_TAIL_LINES: usize = 20;

pub(crate) fn compose_error(
    message: &str,
    stderr: &str,
    stdout: &str,
    hint: Option<&str>,
) -> String {
    let mut out = message.trim().to_string();
    let detail = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    let lines: Vec<&str> = detail.lines().filter(|line| !line.trim().is_empty()).collect();
    if !lines.is_empty() {
        let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
        out.push('\n');
        out.push_str(&lines[start..].join("\n"));
    }
    if let Some(hint) = hint {
        out.push_str("\nhint: ");
        out.push_str(hint);
    }
    out
}

pub(crate) fn invalid_event(backend: BackendKind, reason: impl Into<String>) -> BackendError {
    BackendError::InvalidEvent {
        backend,
        reason: reason.into(),
    }
}
