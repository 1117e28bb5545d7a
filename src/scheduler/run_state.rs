//! Mutable state owned by the capture loop.

use crate::profile::Classification;
use crate::signals::StopFlag;

/// Counters and flags the scheduler updates as it runs.
///
/// Nothing outside the scheduler writes to this; the stop flag is the only
/// part shared with other threads.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Classification of the profile currently in use
    pub classification: Option<Classification>,
    /// Successful captures since start
    pub captures: u64,
    /// Failures since the last successful capture
    pub consecutive_errors: u32,
    /// Failures since start
    pub total_errors: u64,
    /// A night just ended and the end-of-night action has not run yet
    pub end_of_night_pending: bool,
    /// The "skipping daytime" notice was shown for the current day
    pub daytime_notice_shown: bool,
    pub stop: StopFlag,
}

impl RunState {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            stop,
            ..Self::default()
        }
    }

    /// Switch to a new classification.
    pub fn enter(&mut self, classification: Classification) {
        self.classification = Some(classification);
    }

    /// Note that the loop left `from` because the sky changed.
    pub fn leave(&mut self, from: Classification) {
        if from == Classification::Night {
            self.end_of_night_pending = true;
        }
    }

    /// Take the end-of-night flag if it should fire now.
    pub fn take_end_of_night(&mut self, next: Classification) -> bool {
        if self.end_of_night_pending && next != Classification::Night {
            self.end_of_night_pending = false;
            return true;
        }
        false
    }

    pub fn record_capture(&mut self) {
        self.captures += 1;
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_errors += 1;
        self.total_errors += 1;
    }
}
