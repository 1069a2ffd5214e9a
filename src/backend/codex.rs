use super::fingerprint::event_fingerprint;
use super::types::{
    compose_error, invalid_event, Backend, BackendError, BackendEvent, BackendKind,
    BackendOptions,
};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CodexBackend {
    pub binary: String,
}

impl Default for CodexBackend {
    fn default() -> Self {
        Self {
            binary: "codex".to_string(),
        }
    }
}

impl Backend for CodexBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Codex
    }

    fn binary(&self) -> &str {
        &self.binary
    }

    fn build_args(&self, options: &BackendOptions) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "--json".to_string(),
            "--skip-git-repo-check".to_string(),
            "--sandbox".to_string(),
            options.permission_level.as_str().to_string(),
        ];
        if let Some(model) = &options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(profile) = &options.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if let Some(dir) = &options.working_dir {
            args.push("--cd".to_string());
            args.push(dir.display().to_string());
        }
        if let Some(thread_id) = &options.resume_thread_id {
            args.push("resume".to_string());
            args.push(thread_id.clone());
        }
        args.push(options.prompt.clone());
        args
    }

    fn parse_event(&self, raw: &str) -> Result<BackendEvent, BackendError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|err| invalid_event(BackendKind::Codex, format!("invalid json: {err}")))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_event(BackendKind::Codex, "event has no `type`"))?;

        match kind {
            "thread.started" => {
                let thread_id = value
                    .get("thread_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        invalid_event(BackendKind::Codex, "thread.started without thread_id")
                    })?;
                Ok(BackendEvent::SessionStarted {
                    thread_id: thread_id.to_string(),
                })
            }
            "item.completed" => {
                let Some(item) = value.get("item") else {
                    return Ok(other(kind));
                };
                if item.get("type").and_then(Value::as_str) != Some("agent_message") {
                    return Ok(other(kind));
                }
                match extract_agent_message(item) {
                    Some(text) => Ok(BackendEvent::AssistantMessage {
                        fingerprint: event_fingerprint(raw),
                        text,
                    }),
                    None => Ok(other(kind)),
                }
            }
            "turn.completed" => Ok(BackendEvent::Completed { error: None }),
            "turn.failed" | "error" => {
                let message = value
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .or_else(|| value.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("codex reported a failure");
                Ok(BackendEvent::Completed {
                    error: Some(message.to_string()),
                })
            }
            _ => Ok(other(kind)),
        }
    }

    fn format_error(&self, message: &str, stderr: &str, stdout: &str) -> String {
        let combined = format!("{stderr}\n{stdout}").to_ascii_lowercase();
        let hint = if combined.contains("401")
            || combined.contains("unauthorized")
            || combined.contains("not logged in")
        {
            Some("run `codex login` and retry")
        } else if combined.contains("command not found") || combined.contains("no such file") {
            Some("install the codex CLI and make sure it is on PATH")
        } else if combined.contains("rate limit") || combined.contains("429") {
            Some("the model provider is rate limiting; wait and resend")
        } else {
            None
        };
        compose_error(message, stderr, stdout, hint)
    }
}

fn other(kind: &str) -> BackendEvent {
    BackendEvent::Other {
        kind: kind.to_string(),
    }
}

fn extract_agent_message(item: &Value) -> Option<String> {
    for key in ["text", "message"] {
        if let Some(text) = item.get(key).and_then(Value::as_str) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    let content = item.get("content")?;
    if let Some(text) = content.as_str() {
        let trimmed = text.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    let lines: Vec<String> = content
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}
