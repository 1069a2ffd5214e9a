#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to resolve home directory for subagent state root")]
    HomeDirectoryUnavailable,
    #[error("failed to create state path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load registry from {path}: {reason}")]
    Load {
        path: String,
        reason: String,
        #[source]
        source: Option<serde_json::Error>,
    },
    #[error("failed to acquire lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {waited_ms}ms waiting for lock {path}")]
    LockTimeout { path: String, waited_ms: u64 },
    #[error("thread record must include a thread_id")]
    MissingThreadId,
    #[error("thread `{thread_id}` must be created with a controller_id")]
    MissingController { thread_id: String },
    #[error("thread `{thread_id}` not found")]
    ThreadNotFound { thread_id: String },
    #[error(
        "thread `{thread_id}` belongs to controller `{existing}`; ownership cannot be transferred"
    )]
    ControllerImmutable { thread_id: String, existing: String },
    #[error("invalid {kind} `{value}`: {reason}")]
    InvalidId {
        kind: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to generate launch id: {0}")]
    IdGeneration(String),
}

impl StateError {
    pub fn is_load_error(&self) -> bool {
        matches!(self, StateError::Load { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::ThreadNotFound { .. })
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StateError::LockTimeout { .. })
    }
}

pub(crate) fn read_error(path: &std::path::Path, source: std::io::Error) -> StateError {
    StateError::Read {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn write_error(path: &std::path::Path, source: std::io::Error) -> StateError {
    StateError::Write {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn create_dir_error(path: &std::path::Path, source: std::io::Error) -> StateError {
    StateError::CreateDir {
        path: path.display().to_string(),
        source,
    }
}
