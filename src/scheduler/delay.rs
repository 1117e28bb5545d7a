//! Inter-capture delay policy.

use std::time::Duration;

use crate::profile::Classification;

/// Delay between captures while the feedback controller is still converging.
pub const QUICKSTART_DELAY: Duration = Duration::from_secs(1);

/// What the delay policy looks at after a capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayInputs {
    pub classification: Classification,
    pub feedback_active: bool,
    pub quickstart: bool,
    /// The active profile's nominal inter-capture delay
    pub nominal_delay: Duration,
    /// The active profile's nominal exposure
    pub nominal_exposure: Duration,
    /// Shutter actually used for the capture that just finished
    pub used_exposure: Duration,
}

/// Delay before the next capture, chosen by priority:
///
/// 1. Feedback control still converging: [`QUICKSTART_DELAY`].
/// 2. Night: `(nominal exposure - used exposure) + nominal delay`, so that
///    exposure plus idle time adds up to a constant cadence.
/// 3. Otherwise the nominal delay.
pub fn next_delay(inputs: &DelayInputs) -> Duration {
    if inputs.feedback_active && inputs.quickstart {
        return QUICKSTART_DELAY;
    }
    match inputs.classification {
        Classification::Night => {
            inputs.nominal_exposure.saturating_sub(inputs.used_exposure) + inputs.nominal_delay
        }
        Classification::Day | Classification::DarkFrame => inputs.nominal_delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(classification: Classification) -> DelayInputs {
        DelayInputs {
            classification,
            feedback_active: false,
            quickstart: true,
            nominal_delay: Duration::from_millis(10_000),
            nominal_exposure: Duration::from_secs(30),
            used_exposure: Duration::from_secs(12),
        }
    }

    #[test]
    fn test_night_delay_keeps_cadence_constant() {
        let delay = next_delay(&inputs(Classification::Night));
        assert_eq!(delay, Duration::from_secs(18) + Duration::from_millis(10_000));
    }

    #[test]
    fn test_night_delay_with_full_exposure_is_nominal() {
        let mut i = inputs(Classification::Night);
        i.used_exposure = i.nominal_exposure;
        assert_eq!(next_delay(&i), Duration::from_millis(10_000));
    }

    #[test]
    fn test_night_delay_never_negative() {
        let mut i = inputs(Classification::Night);
        i.used_exposure = Duration::from_secs(45);
        assert_eq!(next_delay(&i), Duration::from_millis(10_000));
    }

    #[test]
    fn test_day_delay_is_nominal() {
        assert_eq!(
            next_delay(&inputs(Classification::Day)),
            Duration::from_millis(10_000)
        );
    }

    #[test]
    fn test_quickstart_overrides_every_classification() {
        for c in [
            Classification::Day,
            Classification::Night,
            Classification::DarkFrame,
        ] {
            let mut i = inputs(c);
            i.feedback_active = true;
            assert_eq!(next_delay(&i), QUICKSTART_DELAY);
        }
    }

    #[test]
    fn test_quickstart_ignored_without_feedback() {
        let i = inputs(Classification::Day);
        assert!(i.quickstart);
        assert_eq!(next_delay(&i), Duration::from_millis(10_000));
    }
}
