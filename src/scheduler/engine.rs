//! The capture loop.
//!
//! An outer loop picks the profile for the current classification; an inner
//! loop keeps capturing with it until the classification changes or a stop
//! is requested.

use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;
use std::time::Duration;

use super::delay::{next_delay, DelayInputs};
use super::failure::{classify_capture_error, failure_backoff, FailureKind};
use super::run_state::RunState;
use crate::analysis::{focus_metric, MeanEstimator, MeasurementContext};
use crate::camera::{
    CaptureError, CaptureOperation, CaptureParams, CapturedImage, Flip, ImageFormat, ImageType,
};
use crate::clock::Clock;
use crate::effects::{CaptureMetadata, NotificationImage, SideEffect, SideEffects};
use crate::exposure::{ExposureController, ExposureSetting, FeedbackSettings};
use crate::profile::{CaptureProfile, Classification, DayNight, ProfileSet};
use crate::signals::{StopFlag, StopReason};
use crate::solar::SolarCalculator;

/// Longest single sleep while waiting for night with daytime capture off.
pub const DAY_SKIP_MAX_SLEEP: Duration = Duration::from_secs(10 * 60);

/// Shortest sleep while waiting for night.
pub const DAY_SKIP_MIN_SLEEP: Duration = Duration::from_secs(5);

/// Where and how captured images are written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub directory: PathBuf,
    /// File name without extension, e.g. `image`
    pub file_stem: String,
    pub format: ImageFormat,
    /// JPEG quality or PNG compression, `None` for the format default
    pub quality: Option<u32>,
}

/// Everything the scheduler needs that doesn't change while it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub profiles: ProfileSet,
    pub feedback: FeedbackSettings,
    pub daytime_capture: bool,
    pub dark_frames: bool,
    pub output: OutputSettings,
    pub image_type: ImageType,
    /// Full sensor size; each dimension is divided by the bin factor
    pub sensor_width: u32,
    pub sensor_height: u32,
    pub rotation: u32,
    pub flip: Flip,
    pub saturation: f64,
    pub preview: bool,
    /// Compute a focus metric for every capture
    pub focus_metric: bool,
}

/// The scheduler's collaborators, borrowed for the length of a run.
pub struct Collaborators<'a> {
    pub camera: &'a mut dyn CaptureOperation,
    pub solar: &'a mut dyn SolarCalculator,
    pub estimator: &'a mut dyn MeanEstimator,
    pub effects: &'a dyn SideEffects,
    pub clock: &'a mut dyn Clock,
}

/// Name of the file a capture is written to.
///
/// Dark frames always use `dark.<ext>` so they never replace a normal image.
pub fn capture_file_name(
    file_stem: &str,
    format: ImageFormat,
    dark_frame: bool,
    at: DateTime<Local>,
) -> String {
    if dark_frame {
        format!("dark.{}", format.extension())
    } else {
        format!(
            "{}-{}.{}",
            file_stem,
            at.format("%Y%m%d%H%M%S"),
            format.extension()
        )
    }
}

/// Human-readable exposure length.
pub fn format_exposure(us: u64) -> String {
    if us >= 1_000_000 {
        format!("{:.2} sec", us as f64 / 1_000_000.0)
    } else if us >= 1_000 {
        format!("{:.2} ms", us as f64 / 1_000.0)
    } else {
        format!("{} us", us)
    }
}

pub struct Scheduler<'a> {
    settings: SchedulerSettings,
    io: Collaborators<'a>,
    state: RunState,
    controller: ExposureController,
    sky: DayNight,
}

impl<'a> Scheduler<'a> {
    pub fn new(settings: SchedulerSettings, io: Collaborators<'a>, stop: StopFlag) -> Self {
        let controller = ExposureController::new(settings.feedback, &settings.profiles.day);
        Self {
            settings,
            io,
            state: RunState::new(stop),
            controller,
            sky: DayNight::Day,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn controller(&self) -> &ExposureController {
        &self.controller
    }

    /// Capture until a stop is requested.
    ///
    /// Returns why the loop ended after dispatching the matching notification.
    pub fn run(&mut self) -> StopReason {
        while !self.state.stop.is_set() {
            let classification = self.classify();

            if self.state.take_end_of_night(classification) {
                log::info!("Night is over, running end-of-night processing");
                self.io.effects.dispatch(SideEffect::EndOfNight);
            }
            if classification != Classification::Day {
                self.state.daytime_notice_shown = false;
            }

            if classification == Classification::Day && !self.settings.daytime_capture {
                self.skip_daytime();
                continue;
            }

            let profile = self.enter(classification);
            self.capture_until_change(&profile);
        }

        let reason = self.state.stop.reason().unwrap_or(StopReason::Stop);
        let image = match reason {
            StopReason::Stop => NotificationImage::NotRunning,
            StopReason::Restart => NotificationImage::Restarting,
        };
        match reason {
            StopReason::Stop => log::info!("***** Stopping AllSky *****"),
            StopReason::Restart => log::info!("***** Restarting AllSky *****"),
        }
        log::info!(
            "{} captures, {} errors",
            self.state.captures,
            self.state.total_errors
        );
        self.io.effects.dispatch(SideEffect::Notification(image));
        reason
    }

    /// Query the sky and apply the dark-frame override.
    fn classify(&mut self) -> Classification {
        let now = self.io.clock.now().with_timezone(&Utc);
        self.sky = self.io.solar.classify(now);
        if self.settings.dark_frames {
            Classification::DarkFrame
        } else {
            self.sky.into()
        }
    }

    /// Select and announce the profile for a new classification.
    fn enter(&mut self, classification: Classification) -> CaptureProfile {
        match classification {
            Classification::DarkFrame => {
                log::info!("==========");
                log::info!("Taking dark frames...");
                log::info!("==========");
                self.io
                    .effects
                    .dispatch(SideEffect::Notification(NotificationImage::DarkFrames));
            }
            Classification::Day => {
                log::info!("==========");
                log::info!("=== Starting daytime capture ===");
                log::info!("==========");
            }
            Classification::Night => {
                log::info!("==========");
                log::info!("=== Starting nighttime capture ===");
                log::info!("==========");
            }
        }

        let profile = self.settings.profiles.select(classification);
        self.controller.reset(&profile);
        self.state.enter(classification);

        log::info!(
            "Profile {}: exposure {} ({}), gain {:.2} ({}), bin {}, delay {} ms{}",
            classification,
            format_exposure(profile.exposure_us),
            if profile.exposure_mode.is_auto() { "auto" } else { "manual" },
            profile.gain,
            if profile.gain_mode.is_auto() { "auto" } else { "manual" },
            profile.bin,
            profile.delay.as_millis(),
            if self.controller.is_active() {
                format!(", target mean {:.3}", profile.target_mean)
            } else {
                String::new()
            }
        );
        profile
    }

    /// Wait for night without capturing.
    fn skip_daytime(&mut self) {
        let now = self.io.clock.now();
        let until_night = self.io.solar.time_until_night(now.with_timezone(&Utc));

        let first = !self.state.daytime_notice_shown;
        if first {
            self.state.daytime_notice_shown = true;
            log::info!("It's daytime... we're not saving images");
            self.io
                .effects
                .dispatch(SideEffect::Notification(NotificationImage::CameraOffDuringDay));
            match until_night {
                Some(wait) => log::info!(
                    "Night starts in {} seconds, at {}",
                    wait.as_secs(),
                    (now + chrono::Duration::seconds(wait.as_secs() as i64)).format("%H:%M:%S")
                ),
                None => log::warn!("No night within the next two days, checking periodically"),
            }
        }

        let sleep = until_night
            .unwrap_or(DAY_SKIP_MAX_SLEEP)
            .clamp(DAY_SKIP_MIN_SLEEP, DAY_SKIP_MAX_SLEEP);
        if !first {
            log::debug!("Not quite nighttime, sleeping {} more seconds", sleep.as_secs());
        }
        self.sleep(sleep);
    }

    /// Capture with one profile until the classification changes.
    fn capture_until_change(&mut self, profile: &CaptureProfile) {
        loop {
            if self.state.stop.is_set() {
                return;
            }

            let now = self.io.clock.now();
            let exposure = self.controller.exposure();
            let params = self.params(profile, exposure, now);

            log::info!(
                "STARTING EXPOSURE at: {}   @ {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                format_exposure(exposure.shutter_us)
            );

            let delay = match self.io.camera.capture(&params) {
                Ok(captured) => self.on_captured(profile, &params, captured),
                Err(e) => self.on_capture_failed(profile, &params, e),
            };
            self.sleep(delay);

            let fresh = self.classify();
            if fresh != profile.classification {
                log::info!("Classification changed: {} -> {}", profile.classification, fresh);
                self.state.leave(profile.classification);
                return;
            }
        }
    }

    fn params(
        &self,
        profile: &CaptureProfile,
        exposure: ExposureSetting,
        now: DateTime<Local>,
    ) -> CaptureParams {
        let dark_frame = profile.classification == Classification::DarkFrame;
        let output = &self.settings.output;
        let file_name = capture_file_name(&output.file_stem, output.format, dark_frame, now);
        CaptureParams {
            classification: profile.classification,
            auto_exposure: profile.exposure_mode.is_auto(),
            exposure_us: exposure.shutter_us,
            auto_gain: profile.gain_mode.is_auto(),
            gain: exposure.gain,
            feedback_driven: self.controller.is_active(),
            bin: profile.bin,
            white_balance: profile.white_balance,
            rotation: self.settings.rotation,
            flip: self.settings.flip,
            saturation: self.settings.saturation,
            brightness: profile.brightness,
            quality: output.format.effective_quality(output.quality, dark_frame),
            output: output.directory.join(file_name),
            dark_frame,
            preview: self.settings.preview,
            width: self.settings.sensor_width / profile.bin.max(1),
            height: self.settings.sensor_height / profile.bin.max(1),
        }
    }

    /// Handle a capture the tool reported as successful. Returns the delay.
    fn on_captured(
        &mut self,
        profile: &CaptureProfile,
        params: &CaptureParams,
        captured: CapturedImage,
    ) -> Duration {
        self.state.record_capture();

        let Some(image) = captured.image else {
            log::warn!(
                "Capture reported success but '{}' could not be read, not saving it",
                captured.path.display()
            );
            return self.normal_delay(profile, params);
        };

        let mut mean = None;
        if self.controller.is_active() {
            let context = MeasurementContext {
                shutter_us: params.exposure_us,
                gain: params.gain,
            };
            match self.io.estimator.estimate(&image, &context) {
                Some(measured) => {
                    let adjustment = self.controller.update(measured);
                    log::debug!(
                        "mean={:.3} diff={:.3} step={:.3} -> shutter {}, gain {:.2}, quickstart: {}",
                        measured,
                        adjustment.diff,
                        adjustment.step,
                        format_exposure(adjustment.next.shutter_us),
                        adjustment.next.gain,
                        self.controller.quickstart()
                    );
                    mean = Some(measured);
                }
                None => {
                    log::error!(
                        "Unable to measure brightness of '{}'",
                        captured.path.display()
                    );
                    return self.back_off(profile, FailureKind::Measurement);
                }
            }
        }
        self.state.record_success();

        let focus = self.settings.focus_metric.then(|| focus_metric(&image));
        let metadata = CaptureMetadata {
            exposure_us: params.exposure_us,
            brightness: params.brightness,
            mean,
            auto_exposure: params.auto_exposure,
            auto_gain: params.auto_gain,
            white_balance: params.white_balance,
            gain: params.gain,
            bin: params.bin,
            flip: params.flip,
            bit_depth: self.settings.image_type.bit_depth(),
            focus,
        };
        self.io.effects.dispatch(SideEffect::SaveImage {
            day_or_night: self.sky,
            path: captured.path,
            metadata,
        });

        self.normal_delay(profile, params)
    }

    /// Handle a failed capture. Returns the backoff before retrying.
    fn on_capture_failed(
        &mut self,
        profile: &CaptureProfile,
        params: &CaptureParams,
        error: CaptureError,
    ) -> Duration {
        log::error!(
            "Unable to take picture ({}, exposure {}, gain {:.2}): {}",
            profile.classification,
            format_exposure(params.exposure_us),
            params.gain,
            error
        );
        self.back_off(profile, classify_capture_error(&error))
    }

    /// Count a failure and return the backoff before retrying.
    fn back_off(&mut self, profile: &CaptureProfile, kind: FailureKind) -> Duration {
        self.state.record_failure();
        match kind {
            FailureKind::Interrupted { signal } => {
                log::warn!("Capture command got {}", signal)
            }
            FailureKind::Signal(signal) => {
                log::warn!("Capture command was killed by signal {}", signal)
            }
            FailureKind::Measurement => {
                log::warn!("No brightness measurement, keeping exposure unchanged")
            }
            FailureKind::Tool => {}
        }
        if self.state.consecutive_errors > 1 {
            log::warn!("{} failures in a row", self.state.consecutive_errors);
        }

        let backoff = failure_backoff(profile.delay);
        log::info!(
            "Sleeping from failed exposure: {:.3} seconds",
            backoff.as_secs_f64()
        );
        backoff
    }

    fn normal_delay(&self, profile: &CaptureProfile, params: &CaptureParams) -> Duration {
        let delay = next_delay(&DelayInputs {
            classification: profile.classification,
            feedback_active: self.controller.is_active(),
            quickstart: self.controller.quickstart(),
            nominal_delay: profile.delay,
            nominal_exposure: Duration::from_micros(profile.exposure_us),
            used_exposure: Duration::from_micros(params.exposure_us),
        });
        log::info!("Sleeping {:.1} seconds", delay.as_secs_f64());
        delay
    }

    fn sleep(&mut self, duration: Duration) {
        if self.state.stop.is_set() {
            return;
        }
        self.io.clock.sleep(duration);
    }
}
