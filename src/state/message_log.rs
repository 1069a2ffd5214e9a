use super::error::{create_dir_error, read_error, write_error, StateError};
use super::paths::PathLayout;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct MessageLog {
    path: PathBuf,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_thread(layout: &PathLayout, thread_id: &str) -> Result<Self, StateError> {
        Ok(Self::new(layout.thread_log_path(thread_id)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &LogMessage) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| create_dir_error(parent, source))?;
        }
        let mut line = serde_json::to_string(message).map_err(|source| StateError::Encode {
            path: self.path.display().to_string(),
            source,
        })?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| write_error(&self.path, source))?;
        // One write per line keeps concurrent appenders from interleaving.
        file.write_all(line.as_bytes())
            .map_err(|source| write_error(&self.path, source))
    }

    pub fn read_all(&self) -> Result<Vec<LogMessage>, StateError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(read_error(&self.path, source)),
        };
        let mut messages = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogMessage>(line) {
                Ok(message) => messages.push(message),
                Err(err) => tracing::warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %err,
                    "skipping malformed message log line"
                ),
            }
        }
        Ok(messages)
    }

    pub fn messages_after(
        &self,
        last_pulled_id: Option<&str>,
    ) -> Result<Vec<LogMessage>, StateError> {
        let messages = self.read_all()?;
        let Some(mark) = last_pulled_id.filter(|value| !value.is_empty()) else {
            return Ok(messages);
        };
        match messages.iter().rposition(|message| message.id == mark) {
            Some(index) => Ok(messages[index + 1..].to_vec()),
            None => Ok(messages),
        }
    }

    pub fn last_assistant_message(&self) -> Result<Option<LogMessage>, StateError> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, role: MessageRole, content: &str) -> LogMessage {
        LogMessage {
            id: id.to_string(),
            role,
            content: content.to_string(),
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
            backend: Some("codex".to_string()),
            extra: Map::new(),
        }
    }

    #[test]
    fn high_water_mark_filters_earlier_messages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = MessageLog::new(dir.path().join("t.ndjson"));
        log.append(&message("m1", MessageRole::User, "hi")).expect("m1");
        log.append(&message("m2", MessageRole::Assistant, "hello")).expect("m2");
        log.append(&message("m3", MessageRole::Assistant, "done")).expect("m3");

        let unseen = log.messages_after(Some("m2")).expect("after");
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].id, "m3");
        assert_eq!(log.messages_after(Some("gone")).expect("unknown").len(), 3);
        assert_eq!(
            log.last_assistant_message().expect("last").map(|m| m.content),
            Some("done".to_string())
        );
    }

    #[test]
    fn malformed_lines_are_skipped_and_missing_log_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = MessageLog::new(dir.path().join("t.ndjson"));
        assert!(log.read_all().expect("missing").is_empty());

        log.append(&message("m1", MessageRole::Assistant, "ok")).expect("append");
        let mut file = fs::OpenOptions::new().append(true).open(log.path()).expect("open");
        writeln!(file, "{{truncated").expect("write");
        assert_eq!(log.read_all().expect("read").len(), 1);
    }
}
