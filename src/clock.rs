//! Wall-clock time and sleeping.

use chrono::{DateTime, Local};
use std::time::Duration;

/// Source of the current time and of blocking sleeps.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
    fn sleep(&mut self, duration: Duration);
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
