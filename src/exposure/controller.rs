//! Mean-based exposure feedback controller.

use crate::profile::{clamp_gain, clamp_shutter_us, CaptureProfile, MIN_GAIN, MIN_SHUTTER_US};

/// Default convergence deadband.
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Largest accepted convergence deadband.
pub const MAX_THRESHOLD: f64 = 0.1;

/// Largest accepted step coefficient.
pub const MAX_COEFFICIENT: f64 = 50.0;

/// Polynomial coefficients used to size a correction step.
///
/// The step is measured in stops: the total exposure (shutter x gain) is
/// multiplied by `2^step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepCoefficients {
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
}

impl StepCoefficients {
    /// Signed step for a brightness difference `target - measured`.
    ///
    /// Magnitude is `p0 + p1*|diff| + (p2*|diff|)^2`, sign follows `diff`.
    pub fn step(&self, diff: f64) -> f64 {
        let d = diff.abs();
        let magnitude = self.p0 + self.p1 * d + (self.p2 * d).powi(2);
        magnitude.max(0.0).copysign(diff)
    }
}

impl Default for StepCoefficients {
    fn default() -> Self {
        Self {
            p0: 0.0,
            p1: 5.0,
            p2: 2.0,
        }
    }
}

/// Settings of the opt-in mean-based control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackSettings {
    pub enabled: bool,
    pub threshold: f64,
    pub coefficients: StepCoefficients,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_THRESHOLD,
            coefficients: StepCoefficients::default(),
        }
    }
}

/// Shutter and gain sent to the capture operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureSetting {
    pub shutter_us: u64,
    pub gain: f64,
}

/// Controller state that persists across captures within one classification period.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureFeedbackState {
    pub target_mean: f64,
    pub threshold_mean: f64,
    pub coefficients: StepCoefficients,
    /// Set until the first convergence; enables the fast capture cadence.
    pub quickstart: bool,
    pub current_shutter_us: u64,
    pub current_gain: f64,
    pub feedback_enabled: bool,
}

/// Result of feeding one measurement back into the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    /// `target - measured`
    pub diff: f64,
    /// Step applied, in stops (0 when converged)
    pub step: f64,
    pub converged: bool,
    pub next: ExposureSetting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn pinned(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Converts measured brightness into the next shutter/gain setting.
///
/// In fixed mode the setting simply follows the active profile. In feedback
/// mode one fused total exposure (shutter x gain) is adjusted; shutter takes
/// the change first and gain absorbs the rest, each pinned to the nominal
/// value unless the profile asks for automatic control of it.
#[derive(Debug, Clone)]
pub struct ExposureController {
    settings: FeedbackSettings,
    state: ExposureFeedbackState,
    nominal: ExposureSetting,
    shutter_range: Range,
    gain_range: Range,
}

impl ExposureController {
    pub fn new(settings: FeedbackSettings, profile: &CaptureProfile) -> Self {
        let mut controller = Self {
            settings,
            state: ExposureFeedbackState {
                target_mean: profile.target_mean,
                threshold_mean: settings.threshold,
                coefficients: settings.coefficients,
                quickstart: true,
                current_shutter_us: profile.exposure_us,
                current_gain: profile.gain,
                feedback_enabled: false,
            },
            nominal: ExposureSetting {
                shutter_us: profile.exposure_us,
                gain: profile.gain,
            },
            shutter_range: Range::pinned(profile.exposure_us as f64),
            gain_range: Range::pinned(profile.gain),
        };
        controller.reset(profile);
        controller
    }

    /// Reinitialize for a newly selected profile.
    pub fn reset(&mut self, profile: &CaptureProfile) {
        let shutter_us = clamp_shutter_us(profile.exposure_us);
        let gain = clamp_gain(profile.gain);

        self.nominal = ExposureSetting { shutter_us, gain };
        self.shutter_range = if profile.exposure_mode.is_auto() {
            Range {
                min: MIN_SHUTTER_US as f64,
                max: clamp_shutter_us(profile.max_exposure_us) as f64,
            }
        } else {
            Range::pinned(shutter_us as f64)
        };
        self.gain_range = if profile.gain_mode.is_auto() {
            Range {
                min: MIN_GAIN,
                max: clamp_gain(profile.max_gain),
            }
        } else {
            Range::pinned(gain)
        };

        self.state = ExposureFeedbackState {
            target_mean: profile.target_mean,
            threshold_mean: self.settings.threshold,
            coefficients: self.settings.coefficients,
            quickstart: true,
            current_shutter_us: shutter_us,
            current_gain: gain,
            feedback_enabled: self.settings.enabled && profile.has_auto_adjustment(),
        };
    }

    /// Whether mean-based control drives the next capture.
    pub fn is_active(&self) -> bool {
        self.state.feedback_enabled
    }

    pub fn quickstart(&self) -> bool {
        self.state.quickstart
    }

    /// The shutter and gain to send with the next capture.
    pub fn exposure(&self) -> ExposureSetting {
        if self.is_active() {
            ExposureSetting {
                shutter_us: self.state.current_shutter_us,
                gain: self.state.current_gain,
            }
        } else {
            self.nominal
        }
    }

    /// Feed a measured mean back and compute the next setting.
    pub fn update(&mut self, measured_mean: f64) -> Adjustment {
        let diff = self.state.target_mean - measured_mean;

        if diff.abs() <= self.state.threshold_mean {
            self.state.quickstart = false;
            return Adjustment {
                diff,
                step: 0.0,
                converged: true,
                next: self.exposure(),
            };
        }

        let step = self.state.coefficients.step(diff);
        let total = self.state.current_shutter_us as f64 * self.state.current_gain;
        let next = self.distribute(total * step.exp2());

        self.state.current_shutter_us = next.shutter_us;
        self.state.current_gain = next.gain;

        Adjustment {
            diff,
            step,
            converged: false,
            next,
        }
    }

    /// Split a total exposure into shutter first, then gain.
    fn distribute(&self, total: f64) -> ExposureSetting {
        let shutter = self
            .shutter_range
            .clamp(total / self.gain_range.min)
            .round();
        let shutter_us = clamp_shutter_us(shutter as u64);
        let gain = clamp_gain(self.gain_range.clamp(total / shutter_us as f64));
        ExposureSetting { shutter_us, gain }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Classification, PeriodSettings, WhiteBalance};
    use std::time::Duration;

    fn profile(auto_exposure: bool, auto_gain: bool) -> CaptureProfile {
        CaptureProfile::from_period(
            Classification::Night,
            &PeriodSettings {
                auto_exposure,
                exposure_us: 1_000_000,
                max_exposure_us: 60_000_000,
                auto_gain,
                gain: 4.0,
                max_gain: 16.0,
                brightness: 50,
                bin: 1,
                delay: Duration::from_millis(10_000),
                target_mean: 0.2,
            },
            WhiteBalance::default(),
        )
    }

    fn settings(p0: f64, p1: f64, p2: f64) -> FeedbackSettings {
        FeedbackSettings {
            enabled: true,
            threshold: 0.05,
            coefficients: StepCoefficients { p0, p1, p2 },
        }
    }

    #[test]
    fn test_step_sign_follows_diff() {
        let c = StepCoefficients {
            p0: 0.5,
            p1: 10.0,
            p2: 2.0,
        };
        let up = c.step(0.1);
        let down = c.step(-0.1);
        assert!((up - (0.5 + 1.0 + 0.04)).abs() < 1e-9);
        assert!((down + up).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_mode_follows_profile() {
        let mut controller = ExposureController::new(FeedbackSettings::default(), &profile(true, true));
        assert!(!controller.is_active());
        controller.update(0.9);
        assert_eq!(
            controller.exposure(),
            ExposureSetting {
                shutter_us: 1_000_000,
                gain: 4.0
            }
        );
    }

    #[test]
    fn test_feedback_requires_automatic_adjustment() {
        let controller = ExposureController::new(settings(0.0, 10.0, 0.0), &profile(false, false));
        assert!(!controller.is_active());
    }

    #[test]
    fn test_darker_image_lengthens_shutter() {
        let mut controller = ExposureController::new(settings(0.0, 10.0, 0.0), &profile(true, false));
        let adj = controller.update(0.1);
        assert!(!adj.converged);
        assert!((adj.step - 1.0).abs() < 1e-9);
        assert_eq!(adj.next.shutter_us, 2_000_000);
        assert_eq!(adj.next.gain, 4.0);
    }

    #[test]
    fn test_brighter_image_shortens_shutter() {
        let mut controller = ExposureController::new(settings(0.0, 10.0, 0.0), &profile(true, false));
        let adj = controller.update(0.3);
        assert_eq!(adj.next.shutter_us, 500_000);
    }

    #[test]
    fn test_shutter_respects_auto_exposure_ceiling() {
        let mut controller = ExposureController::new(settings(20.0, 0.0, 0.0), &profile(true, false));
        let adj = controller.update(0.0);
        assert_eq!(adj.next.shutter_us, 60_000_000);
    }

    #[test]
    fn test_shutter_never_below_one_microsecond() {
        let mut controller = ExposureController::new(settings(40.0, 0.0, 0.0), &profile(true, false));
        let adj = controller.update(1.0);
        assert_eq!(adj.next.shutter_us, 1);
    }

    #[test]
    fn test_auto_gain_takes_over_once_shutter_saturates() {
        let mut controller = ExposureController::new(settings(8.0, 0.0, 0.0), &profile(true, true));
        // Nominal total is 1s x 4.0; +8 stops = 1024s-equivalent at gain 1.
        let adj = controller.update(0.0);
        assert_eq!(adj.next.shutter_us, 60_000_000);
        assert!(adj.next.gain > 1.0);
        assert!(adj.next.gain <= 16.0);
    }

    #[test]
    fn test_auto_gain_only_keeps_nominal_shutter() {
        let mut controller = ExposureController::new(settings(0.0, 10.0, 0.0), &profile(false, true));
        assert!(controller.is_active());
        let adj = controller.update(0.1);
        assert_eq!(adj.next.shutter_us, 1_000_000);
        assert!((adj.next.gain - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_quickstart_clears_on_convergence_and_stays_clear() {
        let mut controller = ExposureController::new(settings(0.0, 10.0, 0.0), &profile(true, false));
        assert!(controller.quickstart());
        assert!(controller.update(0.22).converged);
        assert!(!controller.quickstart());
        controller.update(0.9);
        assert!(!controller.quickstart());
    }

    #[test]
    fn test_reset_restores_quickstart_and_nominal_values() {
        let p = profile(true, false);
        let mut controller = ExposureController::new(settings(0.0, 10.0, 0.0), &p);
        controller.update(0.2);
        controller.update(0.0);
        controller.reset(&p);
        assert!(controller.quickstart());
        assert_eq!(controller.exposure().shutter_us, 1_000_000);
    }
}
