use crate::backend::{Backend, BackendOptions};
use crate::ownership::CONTROLLER_ID_ENV;
use crate::state::{LaunchAttempt, LaunchRegistry, PathLayout, StateError};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub const DEFAULT_LAUNCH_GRACE: Duration = Duration::from_millis(400);
pub const LAUNCH_ID_ENV: &str = "CODEX_SUBAGENT_LAUNCH_ID";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to prepare launch output {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn for_backend(backend: &dyn Backend, options: &BackendOptions) -> Self {
        Self {
            program: backend.binary().to_string(),
            args: backend.build_args(options),
            cwd: options.working_dir.clone(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Detached { pid: u32 },
    Exited { pid: u32 },
    Failed { message: String },
}

// Failures are recorded on the attempt. Child stderr goes to `launch-errors/<id>.stderr`.
pub fn launch_detached(
    registry: &LaunchRegistry,
    layout: &PathLayout,
    attempt: &LaunchAttempt,
    command: &LaunchCommand,
    grace: Duration,
) -> Result<LaunchOutcome, LaunchError> {
    let stderr_path = layout.launch_stderr_path(&attempt.id)?;
    if let Some(parent) = stderr_path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let stderr_file =
        fs::File::create(&stderr_path).map_err(|source| io_error(&stderr_path, source))?;

    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .envs(&command.env)
        .env(CONTROLLER_ID_ENV, &attempt.controller_id)
        .env(LAUNCH_ID_ENV, &attempt.id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file));
    if let Some(cwd) = &command.cwd {
        process.current_dir(cwd);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        process.process_group(0);
    }

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(err) => {
            let message = format!("failed to spawn `{}`: {err}", command.program);
            registry.mark_failure(&attempt.id, &message, None)?;
            return Ok(LaunchOutcome::Failed { message });
        }
    };
    let pid = child.id();

    let (tx, rx) = mpsc::channel::<std::io::Result<ExitStatus>>();
    thread::spawn(move || {
        let _ = tx.send(child.wait());
    });

    match rx.recv_timeout(grace) {
        Ok(Ok(status)) if status.success() => {
            tracing::debug!(launch_id = %attempt.id, pid, "worker exited inside grace window");
            if fs::metadata(&stderr_path).is_ok_and(|meta| meta.len() == 0) {
                registry.discard_captured_stderr(&attempt.id);
            }
            Ok(LaunchOutcome::Exited { pid })
        }
        Ok(Ok(status)) => {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            let message = format!("`{}` exited early with {status}", command.program);
            registry.mark_failure(&attempt.id, &message, Some(&stderr))?;
            Ok(LaunchOutcome::Failed { message })
        }
        Ok(Err(err)) => {
            let message = format!("failed to observe `{}`: {err}", command.program);
            registry.mark_failure(&attempt.id, &message, None)?;
            Ok(LaunchOutcome::Failed { message })
        }
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
            tracing::info!(launch_id = %attempt.id, pid, "worker detached");
            Ok(LaunchOutcome::Detached { pid })
        }
    }
}

fn io_error(path: &std::path::Path, source: std::io::Error) -> LaunchError {
    LaunchError::Io {
        path: path.display().to_string(),
        source,
    }
}
