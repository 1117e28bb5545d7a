//! Capture failure classification and retry backoff.

use std::time::Duration;

use crate::camera::CaptureError;

/// Share of the nominal delay slept after a failed capture.
pub const FAILURE_BACKOFF_PERCENT: u32 = 25;

/// Shortest backoff after a failure, so a zero delay can't busy-loop.
pub const MIN_FAILURE_BACKOFF: Duration = Duration::from_millis(1);

/// What went wrong with a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The capture tool was stopped by an interrupt, termination or hangup signal
    Interrupted { signal: &'static str },
    /// The capture tool was killed by some other signal
    Signal(i32),
    /// The capture tool failed on its own
    Tool,
    /// The image was captured but its brightness could not be measured
    Measurement,
}

/// Name of the signals that mean someone asked us to stop or restart.
pub fn interrupt_signal_name(signal: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        match signal {
            libc::SIGINT => Some("SIGINT"),
            libc::SIGTERM => Some("SIGTERM"),
            libc::SIGHUP => Some("SIGHUP"),
            _ => None,
        }
    }
    #[cfg(not(unix))]
    {
        match signal {
            2 => Some("SIGINT"),
            15 => Some("SIGTERM"),
            1 => Some("SIGHUP"),
            _ => None,
        }
    }
}

/// Classify a capture error for diagnostics.
pub fn classify_capture_error(error: &CaptureError) -> FailureKind {
    match error {
        CaptureError::ToolFailed { status } => match status.signal {
            Some(sig) => match interrupt_signal_name(sig) {
                Some(name) => FailureKind::Interrupted { signal: name },
                None => FailureKind::Signal(sig),
            },
            None => FailureKind::Tool,
        },
        _ => FailureKind::Tool,
    }
}

/// Sleep after a failure: a quarter of the nominal delay, never zero.
pub fn failure_backoff(nominal_delay: Duration) -> Duration {
    (nominal_delay * FAILURE_BACKOFF_PERCENT / 100).max(MIN_FAILURE_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ToolExit;

    #[test]
    fn test_backoff_is_quarter_of_nominal() {
        assert_eq!(
            failure_backoff(Duration::from_millis(10_000)),
            Duration::from_millis(2_500)
        );
        assert_eq!(
            failure_backoff(Duration::from_secs(60)),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_backoff_never_zero() {
        assert_eq!(failure_backoff(Duration::ZERO), MIN_FAILURE_BACKOFF);
        assert_eq!(failure_backoff(Duration::from_millis(2)), MIN_FAILURE_BACKOFF);
    }

    #[test]
    fn test_backoff_shorter_than_short_delays() {
        for ms in [4, 10, 40, 100, 400] {
            let nominal = Duration::from_millis(ms);
            let backoff = failure_backoff(nominal);
            assert!(backoff < nominal, "{:?} -> {:?}", nominal, backoff);
            assert!(!backoff.is_zero());
        }
        assert_eq!(
            failure_backoff(Duration::from_millis(10)),
            Duration::from_micros(2_500)
        );
    }

    #[test]
    fn test_exit_code_is_tool_failure() {
        let err = CaptureError::ToolFailed {
            status: ToolExit {
                code: Some(1),
                signal: None,
            },
        };
        assert_eq!(classify_capture_error(&err), FailureKind::Tool);
    }

    #[test]
    fn test_interrupt_signals_are_named() {
        for (sig, name) in [(2, "SIGINT"), (15, "SIGTERM"), (1, "SIGHUP")] {
            let err = CaptureError::ToolFailed {
                status: ToolExit {
                    code: None,
                    signal: Some(sig),
                },
            };
            assert_eq!(
                classify_capture_error(&err),
                FailureKind::Interrupted { signal: name }
            );
        }
    }

    #[test]
    fn test_other_signal() {
        let err = CaptureError::ToolFailed {
            status: ToolExit {
                code: None,
                signal: Some(9),
            },
        };
        assert_eq!(classify_capture_error(&err), FailureKind::Signal(9));
    }

    #[test]
    fn test_timeout_is_tool_failure() {
        let err = CaptureError::TimedOut {
            after: Duration::from_secs(70),
        };
        assert_eq!(classify_capture_error(&err), FailureKind::Tool);
    }
}
