//! Capture scheduling: the day/night state machine, the delay policy and
//! failure recovery.

mod delay;
mod engine;
mod failure;
mod run_state;

pub use delay::{next_delay, DelayInputs, QUICKSTART_DELAY};
pub use engine::{
    capture_file_name, format_exposure, Collaborators, OutputSettings, Scheduler,
    SchedulerSettings, DAY_SKIP_MAX_SLEEP, DAY_SKIP_MIN_SLEEP,
};
pub use failure::{
    classify_capture_error, failure_backoff, interrupt_signal_name, FailureKind,
    FAILURE_BACKOFF_PERCENT, MIN_FAILURE_BACKOFF,
};
pub use run_state::RunState;
