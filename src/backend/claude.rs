use super::fingerprint::event_fingerprint;
use super::types::{
    compose_error, invalid_event, Backend, BackendError, BackendEvent, BackendKind,
    BackendOptions,
};
use crate::state::PermissionLevel;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ClaudeBackend {
    pub binary: String,
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
        }
    }
}

fn text_block(block: &Value) -> Option<&str> {
    if block.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    block.get("text").and_then(Value::as_str)
}

fn permission_mode(level: PermissionLevel) -> &'static str {
    match level {
        PermissionLevel::ReadOnly => "plan",
        PermissionLevel::WorkspaceWrite => "acceptEdits",
    }
}

impl Backend for ClaudeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    fn binary(&self) -> &str {
        &self.binary
    }

    fn build_args(&self, options: &BackendOptions) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--permission-mode".to_string(),
            permission_mode(options.permission_level).to_string(),
        ];
        if let Some(thread_id) = &options.resume_thread_id {
            args.push("--resume".to_string());
            args.push(thread_id.clone());
        }
        if let Some(model) = &options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(dir) = &options.working_dir {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }
        args.push(options.prompt.clone());
        args
    }

    fn parse_event(&self, raw: &str) -> Result<BackendEvent, BackendError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|err| invalid_event(BackendKind::Claude, format!("invalid json: {err}")))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_event(BackendKind::Claude, "event has no `type`"))?;

        match kind {
            "system" if value.get("subtype").and_then(Value::as_str) == Some("init") => {
                let session_id = value
                    .get("session_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        invalid_event(BackendKind::Claude, "init event without session_id")
                    })?;
                Ok(BackendEvent::SessionStarted {
                    thread_id: session_id.to_string(),
                })
            }
            "assistant" => {
                let text = value
                    .get("message")
                    .and_then(|message| message.get("content"))
                    .and_then(Value::as_array)
                    .map(|blocks| {
                        blocks
                            .iter()
                            .filter_map(text_block)
                            .map(str::trim)
                            .filter(|text| !text.is_empty())
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                if text.is_empty() {
                    // Tool-use only turns carry no prose.
                    return Ok(BackendEvent::Other {
                        kind: kind.to_string(),
                    });
                }
                Ok(BackendEvent::AssistantMessage {
                    fingerprint: event_fingerprint(raw),
                    text,
                })
            }
            "result" => {
                let is_error = value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let error = is_error.then(|| {
                    value
                        .get("result")
                        .and_then(Value::as_str)
                        .or_else(|| value.get("subtype").and_then(Value::as_str))
                        .unwrap_or("claude reported a failure")
                        .to_string()
                });
                Ok(BackendEvent::Completed { error })
            }
            _ => Ok(BackendEvent::Other {
                kind: kind.to_string(),
            }),
        }
    }

    fn format_error(&self, message: &str, stderr: &str, stdout: &str) -> String {
        let combined = format!("{stderr}\n{stdout}").to_ascii_lowercase();
        let hint = if combined.contains("invalid api key")
            || combined.contains("please run /login")
            || combined.contains("401")
        {
            Some("run `claude` interactively and complete `/login`, then retry")
        } else if combined.contains("command not found") || combined.contains("no such file") {
            Some("install the claude CLI and make sure it is on PATH")
        } else if combined.contains("no conversation found") {
            Some("the session id is unknown to claude; start a new thread instead of resuming")
        } else {
            None
        };
        compose_error(message, stderr, stdout, hint)
    }
}
