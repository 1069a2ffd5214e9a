pub mod coordinator;
pub mod error;
pub mod signal;

pub use coordinator::{
    FinishedThread, WaitCoordinator, WaitOutcome, WaitRequest, WaitSelection,
    DEFAULT_POLL_INTERVAL, REMOVED_STATUS,
};
pub use error::WaitError;
pub use signal::{
    CancellationToken, Clock, ManualClock, SleepOutcome, Sleeper, SystemClock, ThreadSleeper,
};
