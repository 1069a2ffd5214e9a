pub mod controller;
pub mod guard;

pub use controller::{
    command_matches, ControllerError, ControllerId, ControllerIdentity, ProcessInfo,
    ProcessTable, PsProcessTable, CONTROLLER_ID_ENV, DEFAULT_CONTROLLER_PATTERN,
    DEFAULT_MAX_ANCESTRY_DEPTH,
};
pub use guard::{assert_ownership, load_owned_thread, owned_threads, OwnershipError};
