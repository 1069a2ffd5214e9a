use super::error::{create_dir_error, write_error, StateError};
use super::file_mutex::{lock_path_for, with_lock, LockOptions};
use super::paths::PathLayout;
use super::record_file::{load_records, save_records};
use super::thread_registry::{compare_timestamps_desc, PermissionLevel};
use crate::shared::ids::generate_launch_id;
use crate::shared::time::{format_iso, now_utc, parse_iso};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STALE_LAUNCH_MESSAGE: &str = "Stale launch";
pub const DEFAULT_STALE_LAUNCH_THRESHOLD: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchKind {
    Start,
    Send,
}

impl std::fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchKind::Start => write!(f, "start"),
            LaunchKind::Send => write!(f, "send"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStatus {
    Pending,
    Failed,
}

impl std::fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchStatus::Pending => write!(f, "pending"),
            LaunchStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchAttempt {
    pub id: String,
    pub controller_id: String,
    #[serde(rename = "type")]
    pub kind: LaunchKind,
    pub status: LaunchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LaunchAttempt {
    pub fn is_pending(&self) -> bool {
        self.status == LaunchStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLaunchAttempt {
    pub controller_id: String,
    pub kind: LaunchKind,
    pub label: Option<String>,
    pub role: Option<String>,
    pub permission_level: Option<PermissionLevel>,
    pub thread_id: Option<String>,
}

impl NewLaunchAttempt {
    pub fn start(controller_id: impl Into<String>) -> Self {
        Self {
            controller_id: controller_id.into(),
            kind: LaunchKind::Start,
            label: None,
            role: None,
            permission_level: None,
            thread_id: None,
        }
    }

    pub fn send(controller_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            kind: LaunchKind::Send,
            thread_id: Some(thread_id.into()),
            ..Self::start(controller_id)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct LaunchRegistry {
    path: PathBuf,
    layout: PathLayout,
    lock_options: LockOptions,
}

impl LaunchRegistry {
    pub fn for_layout(layout: &PathLayout) -> Self {
        Self {
            path: layout.launches_file(),
            layout: layout.clone(),
            lock_options: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<String, LaunchAttempt>, StateError> {
        load_records(&self.path, "id")
    }

    pub fn list_attempts(&self) -> Result<Vec<LaunchAttempt>, StateError> {
        let mut attempts: Vec<LaunchAttempt> = self.load()?.into_values().collect();
        attempts.sort_by(|a, b| {
            compare_timestamps_desc(&a.updated_at, &b.updated_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(attempts)
    }

    pub fn get(&self, launch_id: &str) -> Result<Option<LaunchAttempt>, StateError> {
        Ok(self.load()?.remove(launch_id))
    }

    pub fn create_attempt(&self, input: NewLaunchAttempt) -> Result<LaunchAttempt, StateError> {
        let now = now_utc();
        let attempt = self.mutate(|attempts| {
            let id = loop {
                let candidate =
                    generate_launch_id(now.timestamp_millis()).map_err(StateError::IdGeneration)?;
                if !attempts.contains_key(&candidate) {
                    break candidate;
                }
            };
            let stamp = format_iso(now);
            let attempt = LaunchAttempt {
                id: id.clone(),
                controller_id: input.controller_id,
                kind: input.kind,
                status: LaunchStatus::Pending,
                label: input.label,
                role: input.role,
                permission_level: input.permission_level,
                thread_id: input.thread_id,
                error_message: None,
                log_path: None,
                created_at: stamp.clone(),
                updated_at: stamp,
                extra: Map::new(),
            };
            attempts.insert(id, attempt.clone());
            Ok((attempt, true))
        })?;
        tracing::info!(launch_id = %attempt.id, kind = %attempt.kind, "launch attempt recorded");
        Ok(attempt)
    }

    pub fn mark_failure(
        &self,
        launch_id: &str,
        message: &str,
        stderr: Option<&str>,
    ) -> Result<Option<LaunchAttempt>, StateError> {
        let now = now_utc();
        let updated = self.mutate(|attempts| {
            let Some(attempt) = attempts.get_mut(launch_id) else {
                return Ok((None, false));
            };
            self.fail_attempt(attempt, message, stderr, now)?;
            Ok((Some(attempt.clone()), true))
        })?;
        if let Some(attempt) = &updated {
            tracing::warn!(
                launch_id,
                log_path = ?attempt.log_path,
                "launch attempt failed: {message}"
            );
        }
        Ok(updated)
    }

    pub fn mark_success(
        &self,
        launch_id: &str,
        thread_id: Option<&str>,
    ) -> Result<Option<LaunchAttempt>, StateError> {
        let removed = self.mutate(|attempts| {
            let removed = attempts.remove(launch_id);
            let changed = removed.is_some();
            Ok((removed, changed))
        })?;
        if removed.is_some() {
            self.discard_captured_stderr(launch_id);
            tracing::info!(launch_id, thread_id = ?thread_id, "launch attempt succeeded");
        }
        Ok(removed)
    }

    pub fn cleanup_stale(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, StateError> {
        let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        let message = format!(
            "{STALE_LAUNCH_MESSAGE}: no thread was recorded within {}s of launch",
            threshold.as_secs()
        );
        let count = self.mutate(|attempts| {
            let mut count = 0;
            for attempt in attempts.values_mut() {
                if !attempt.is_pending() {
                    continue;
                }
                let Some(created_at) = parse_iso(&attempt.created_at) else {
                    tracing::warn!(
                        launch_id = %attempt.id,
                        created_at = %attempt.created_at,
                        "launch attempt has unparseable created_at"
                    );
                    continue;
                };
                if now.signed_duration_since(created_at).num_milliseconds() <= threshold_ms {
                    continue;
                }
                self.fail_attempt(attempt, &message, None, now)?;
                count += 1;
            }
            Ok((count, count > 0))
        })?;
        if count > 0 {
            tracing::warn!(count, "marked stale launch attempts as failed");
        }
        Ok(count)
    }

    fn fail_attempt(
        &self,
        attempt: &mut LaunchAttempt,
        message: &str,
        stderr: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        let captured = match stderr {
            Some(_) => None,
            None => self.captured_stderr(&attempt.id),
        };
        let stderr = stderr.or(captured.as_deref());
        let log_path = self.write_diagnostic(&attempt.id, message, stderr, now)?;
        self.discard_captured_stderr(&attempt.id);
        attempt.status = LaunchStatus::Failed;
        attempt.error_message = Some(message.to_string());
        attempt.log_path = Some(log_path.display().to_string());
        attempt.updated_at = format_iso(now);
        Ok(())
    }

    fn captured_stderr(&self, launch_id: &str) -> Option<String> {
        let path = self.layout.launch_stderr_path(launch_id).ok()?;
        fs::read_to_string(path).ok()
    }

    pub(crate) fn discard_captured_stderr(&self, launch_id: &str) {
        let Ok(path) = self.layout.launch_stderr_path(launch_id) else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                launch_id,
                path = %path.display(),
                error = %err,
                "failed to remove captured stderr"
            ),
        }
    }

    // Write-once: a second failure for the same id keeps the first file.
    fn write_diagnostic(
        &self,
        launch_id: &str,
        message: &str,
        stderr: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, StateError> {
        let path = self.layout.launch_error_log_path(launch_id)?;
        let dir = self.layout.launch_errors_dir();
        fs::create_dir_all(&dir).map_err(|source| create_dir_error(&dir, source))?;

        let mut body = format!(
            "timestamp: {}\nlaunch_id: {launch_id}\nmessage: {message}\n",
            format_iso(now)
        );
        if let Some(stderr) = stderr.map(str::trim).filter(|value| !value.is_empty()) {
            body.push_str("\n--- stderr ---\n");
            body.push_str(stderr);
            body.push('\n');
        }
        let backtrace = std::backtrace::Backtrace::capture();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            body.push_str("\n--- backtrace ---\n");
            body.push_str(&backtrace.to_string());
            body.push('\n');
        }

        match fs::OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(mut file) => file
                .write_all(body.as_bytes())
                .map_err(|source| write_error(&path, source))?,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(source) => return Err(write_error(&path, source)),
        }
        Ok(path)
    }

    fn mutate<T>(
        &self,
        body: impl FnOnce(&mut BTreeMap<String, LaunchAttempt>) -> Result<(T, bool), StateError>,
    ) -> Result<T, StateError> {
        with_lock(&lock_path_for(&self.path), self.lock_options, || {
            let mut attempts = self.load()?;
            let (value, changed) = body(&mut attempts)?;
            if changed {
                save_records(&self.path, &attempts)?;
            }
            Ok(value)
        })
    }
}
