//! Convergence of the mean-brightness feedback loop.
//!
//! The sky is modelled as `mean = min(1, shutter * gain / K)`; from any
//! starting exposure the controller must reach the deadband around the
//! target in a bounded number of steps, and quickstart must clear exactly
//! when it does.

use std::time::Duration;

use allsky_capture::exposure::{ExposureController, FeedbackSettings, StepCoefficients};
use allsky_capture::profile::{CaptureProfile, Classification, PeriodSettings, WhiteBalance};

/// Exposure (shutter x gain) that saturates the sensor.
const K: f64 = 10_000_000.0;

const MAX_ITERATIONS: usize = 40;

fn sky(shutter_us: u64, gain: f64) -> f64 {
    (shutter_us as f64 * gain / K).min(1.0)
}

fn profile(exposure_us: u64, gain: f64, auto_exposure: bool, auto_gain: bool) -> CaptureProfile {
    CaptureProfile::from_period(
        Classification::Night,
        &PeriodSettings {
            auto_exposure,
            exposure_us,
            max_exposure_us: 60_000_000,
            auto_gain,
            gain,
            max_gain: 16.0,
            brightness: 0,
            bin: 1,
            delay: Duration::from_secs(10),
            target_mean: 0.2,
        },
        WhiteBalance::default(),
    )
}

fn feedback(coefficients: StepCoefficients) -> FeedbackSettings {
    FeedbackSettings {
        enabled: true,
        threshold: 0.05,
        coefficients,
    }
}

/// Run the loop and return how many captures it took to converge.
fn converge(controller: &mut ExposureController) -> usize {
    for i in 1..=MAX_ITERATIONS {
        let setting = controller.exposure();
        assert!(controller.quickstart(), "quickstart cleared early at step {}", i);

        let adjustment = controller.update(sky(setting.shutter_us, setting.gain));
        if adjustment.converged {
            assert!(!controller.quickstart());
            let mean = sky(adjustment.next.shutter_us, adjustment.next.gain);
            assert!((0.2 - mean).abs() <= 0.05);
            return i;
        }
    }
    panic!("no convergence within {} captures", MAX_ITERATIONS);
}

#[test]
fn test_converges_from_any_start() {
    for start_us in [100, 10_000, 1_000_000, 2_000_000, 20_000_000, 60_000_000] {
        let mut controller = ExposureController::new(
            feedback(StepCoefficients::default()),
            &profile(start_us, 1.0, true, false),
        );
        let steps = converge(&mut controller);
        assert!(steps <= 25, "start {} us took {} steps", start_us, steps);
    }
}

#[test]
fn test_converges_with_linear_step() {
    let coefficients = StepCoefficients {
        p0: 0.0,
        p1: 10.0,
        p2: 0.0,
    };
    for start_us in [1_000, 500_000, 30_000_000] {
        let mut controller =
            ExposureController::new(feedback(coefficients), &profile(start_us, 1.0, true, false));
        converge(&mut controller);
    }
}

#[test]
fn test_converges_with_auto_gain_only() {
    // Shutter pinned at 0.5 s, gain does all the work: target needs gain 4.
    let mut controller = ExposureController::new(
        feedback(StepCoefficients::default()),
        &profile(500_000, 1.0, false, true),
    );
    converge(&mut controller);
    let setting = controller.exposure();
    assert_eq!(setting.shutter_us, 500_000);
    assert!(setting.gain > 1.0);
}

#[test]
fn test_converged_setting_is_stable() {
    let mut controller = ExposureController::new(
        feedback(StepCoefficients::default()),
        &profile(100_000, 1.0, true, false),
    );
    converge(&mut controller);
    let settled = controller.exposure();

    for _ in 0..5 {
        let adjustment = controller.update(sky(settled.shutter_us, settled.gain));
        assert!(adjustment.converged);
        assert_eq!(controller.exposure(), settled);
    }
}

#[test]
fn test_reset_restores_quickstart() {
    let night = profile(100_000, 1.0, true, false);
    let mut controller = ExposureController::new(feedback(StepCoefficients::default()), &night);
    converge(&mut controller);
    assert!(!controller.quickstart());

    controller.reset(&night);
    assert!(controller.quickstart());
    assert_eq!(controller.exposure().shutter_us, 100_000);
}
