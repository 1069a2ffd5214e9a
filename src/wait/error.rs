use crate::ownership::OwnershipError;
use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("nothing to wait for: no matching threads or pending launches")]
    NothingToWait,
    #[error("timed out after {elapsed_ms}ms with {unresolved} unresolved target(s)")]
    Timeout { unresolved: usize, elapsed_ms: u64 },
    #[error("wait aborted")]
    Aborted,
    #[error("launch `{launch_id}` failed: {message}")]
    LaunchFailed {
        launch_id: String,
        message: String,
        log_path: Option<String>,
    },
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
}
