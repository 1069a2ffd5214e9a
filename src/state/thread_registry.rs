use super::error::StateError;
use super::file_mutex::{lock_path_for, with_lock, LockOptions};
use super::paths::PathLayout;
use super::record_file::{load_records, save_records};
use crate::shared::time::{now_iso, parse_iso};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionLevel {
    ReadOnly,
    WorkspaceWrite,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read-only" => Ok(Self::ReadOnly),
            "workspace-write" => Ok(Self::WorkspaceWrite),
            _ => Err("permission level must be one of: read-only, workspace-write".to_string()),
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Unknown statuses are kept verbatim and count as not running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Queued,
    Pending,
    Waiting,
    Completed,
    Failed,
    Stopped,
    Other(String),
}

impl ThreadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "queued" => Self::Queued,
            "pending" => Self::Pending,
            "waiting" => Self::Waiting,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Queued | Self::Pending)
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ThreadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ThreadStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ThreadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pulled_id: Option<String>,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadMetadata {
    fn empty(thread_id: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            role: None,
            permission_level: None,
            profile: None,
            status: None,
            last_message_id: None,
            last_pulled_id: None,
            updated_at: String::new(),
            controller_id: None,
            label: None,
            persona: None,
            error_message: None,
            launch_id: None,
            backend: None,
            extra: Map::new(),
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.controller_id.as_deref().filter(|value| !value.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.status.as_ref().is_some_and(ThreadStatus::is_active)
    }

    pub fn status_label(&self) -> &str {
        self.status.as_ref().map(ThreadStatus::as_str).unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadPatch {
    pub role: Option<String>,
    pub permission_level: Option<PermissionLevel>,
    pub profile: Option<String>,
    pub status: Option<ThreadStatus>,
    pub last_message_id: Option<String>,
    pub last_pulled_id: Option<String>,
    pub updated_at: Option<String>,
    pub controller_id: Option<String>,
    pub label: Option<String>,
    pub persona: Option<String>,
    pub error_message: Option<String>,
    pub launch_id: Option<String>,
    pub backend: Option<String>,
    pub extra: Map<String, Value>,
}

impl ThreadPatch {
    pub fn status(status: ThreadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn names_controller(&self) -> bool {
        self.controller_id
            .as_deref()
            .is_some_and(|value| !value.is_empty())
    }

    fn apply_to(self, record: &mut ThreadMetadata) -> Result<(), StateError> {
        if let Some(requested) = self.controller_id.filter(|value| !value.is_empty()) {
            match record.owner() {
                Some(existing) if existing != requested => {
                    return Err(StateError::ControllerImmutable {
                        thread_id: record.thread_id.clone(),
                        existing: existing.to_string(),
                    })
                }
                Some(_) => {}
                None => record.controller_id = Some(requested),
            }
        }

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    record.$field = Some(value);
                })*
            };
        }
        merge!(
            role,
            permission_level,
            profile,
            status,
            last_message_id,
            last_pulled_id,
            label,
            persona,
            error_message,
            launch_id,
            backend,
        );
        record.extra.extend(self.extra);
        record.updated_at = self
            .updated_at
            .filter(|value| !value.is_empty())
            .unwrap_or_else(now_iso);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ThreadRegistry {
    path: PathBuf,
    lock_options: LockOptions,
}

impl ThreadRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_options: LockOptions::default(),
        }
    }

    pub fn for_layout(layout: &PathLayout) -> Self {
        Self::new(layout.threads_file())
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }

    pub fn load(&self) -> Result<BTreeMap<String, ThreadMetadata>, StateError> {
        load_records(&self.path, "thread_id")
    }

    pub fn list_threads(&self) -> Result<Vec<ThreadMetadata>, StateError> {
        let mut threads: Vec<ThreadMetadata> = self.load()?.into_values().collect();
        threads.sort_by(|a, b| {
            compare_timestamps_desc(&a.updated_at, &b.updated_at)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(threads)
    }

    pub fn get(&self, thread_id: &str) -> Result<Option<ThreadMetadata>, StateError> {
        Ok(self.load()?.remove(thread_id))
    }

    // New records must name a controller; omitted fields keep their stored values.
    pub fn upsert(
        &self,
        thread_id: &str,
        patch: ThreadPatch,
    ) -> Result<ThreadMetadata, StateError> {
        if thread_id.trim().is_empty() {
            return Err(StateError::MissingThreadId);
        }
        let record = self.mutate(|threads| {
            let mut record = match threads.get(thread_id) {
                Some(existing) => existing.clone(),
                None if patch.names_controller() => ThreadMetadata::empty(thread_id),
                None => {
                    return Err(StateError::MissingController {
                        thread_id: thread_id.to_string(),
                    })
                }
            };
            patch.apply_to(&mut record)?;
            threads.insert(thread_id.to_string(), record.clone());
            Ok((record, true))
        })?;
        tracing::info!(thread_id, status = record.status_label(), "thread upserted");
        Ok(record)
    }

    pub fn update_thread(
        &self,
        thread_id: &str,
        patch: ThreadPatch,
    ) -> Result<ThreadMetadata, StateError> {
        let record = self.mutate(|threads| {
            let Some(record) = threads.get_mut(thread_id) else {
                return Err(StateError::ThreadNotFound {
                    thread_id: thread_id.to_string(),
                });
            };
            patch.apply_to(record)?;
            Ok((record.clone(), true))
        })?;
        tracing::debug!(thread_id, status = record.status_label(), "thread updated");
        Ok(record)
    }

    pub fn remove(&self, thread_id: &str) -> Result<Option<ThreadMetadata>, StateError> {
        let removed = self.mutate(|threads| {
            let removed = threads.remove(thread_id);
            let changed = removed.is_some();
            Ok((removed, changed))
        })?;
        if removed.is_some() {
            tracing::info!(thread_id, "thread removed from registry");
        }
        Ok(removed)
    }

    fn mutate<T>(
        &self,
        body: impl FnOnce(&mut BTreeMap<String, ThreadMetadata>) -> Result<(T, bool), StateError>,
    ) -> Result<T, StateError> {
        with_lock(&self.lock_path(), self.lock_options, || {
            let mut threads = self.load()?;
            let (value, changed) = body(&mut threads)?;
            if changed {
                save_records(&self.path, &threads)?;
            }
            Ok(value)
        })
    }
}

pub(crate) fn compare_timestamps_desc(a: &str, b: &str) -> Ordering {
    match (parse_iso(a), parse_iso(b)) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.cmp(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_round_trips_and_is_not_active() {
        let status: ThreadStatus = serde_json::from_str("\"archived\"").expect("parse");
        assert_eq!(status, ThreadStatus::Other("archived".to_string()));
        assert!(!status.is_active());
        assert_eq!(serde_json::to_string(&status).expect("encode"), "\"archived\"");
    }

    #[test]
    fn queued_and_pending_count_as_active() {
        assert!(ThreadStatus::parse("queued").is_active());
        assert!(ThreadStatus::parse("PENDING").is_active());
        assert!(!ThreadStatus::parse("waiting").is_active());
    }

    #[test]
    fn unparseable_timestamps_sort_after_valid_ones() {
        assert_eq!(
            compare_timestamps_desc("2024-01-01T00:00:00.000Z", "garbage"),
            Ordering::Less
        );
        assert_eq!(
            compare_timestamps_desc("2024-01-01T00:00:00Z", "2024-01-02T00:00:00+00:00"),
            Ordering::Greater
        );
    }
}
