pub mod claude;
pub mod codex;
pub mod fingerprint;
pub mod types;

pub use claude::ClaudeBackend;
pub use codex::CodexBackend;
pub use fingerprint::event_fingerprint;
pub use types::{
    backend_for, Backend, BackendError, BackendEvent, BackendKind, BackendOptions,
};
