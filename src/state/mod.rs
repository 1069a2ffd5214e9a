pub mod error;
pub mod file_mutex;
pub mod launch_registry;
pub mod message_log;
pub mod paths;
mod record_file;
pub mod thread_registry;

pub use error::StateError;
pub use file_mutex::{acquire, lock_path_for, with_lock, FileLock, LockOptions};
pub use launch_registry::{
    LaunchAttempt, LaunchKind, LaunchRegistry, LaunchStatus, NewLaunchAttempt,
    DEFAULT_STALE_LAUNCH_THRESHOLD, STALE_LAUNCH_MESSAGE,
};
pub use message_log::{LogMessage, MessageLog, MessageRole};
pub use paths::{default_state_root_path, PathLayout, DEFAULT_STATE_ROOT_DIR, STATE_ROOT_ENV};
pub use thread_registry::{
    PermissionLevel, ThreadMetadata, ThreadPatch, ThreadRegistry, ThreadStatus,
};
