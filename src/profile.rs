//! Capture profiles and day/night classification.
//!
//! A [`CaptureProfile`] is the immutable parameter set selected whenever the
//! active [`Classification`] changes. The scheduler hands it to both the
//! capture operation and the exposure controller.

use std::fmt;
use std::time::Duration;

/// Shortest shutter the camera accepts, in microseconds.
pub const MIN_SHUTTER_US: u64 = 1;

/// Longest shutter the camera accepts (200 seconds), in microseconds.
pub const MAX_SHUTTER_US: u64 = 200_000_000;

/// Lowest analog gain of the sensor.
pub const MIN_GAIN: f64 = 1.0;

/// Highest analog gain of the sensor.
pub const MAX_GAIN: f64 = 16.0;

/// Allowed range for the red and blue white-balance components.
pub const WHITE_BALANCE_RANGE: (f64, f64) = (0.1, 10.0);

/// Largest supported binning factor.
pub const MAX_BIN: u32 = 3;

/// Clamp a shutter time to the camera's absolute bounds.
pub fn clamp_shutter_us(shutter_us: u64) -> u64 {
    shutter_us.clamp(MIN_SHUTTER_US, MAX_SHUTTER_US)
}

/// Clamp a gain value to the camera's analog gain range.
pub fn clamp_gain(gain: f64) -> f64 {
    if gain.is_nan() {
        return MIN_GAIN;
    }
    gain.clamp(MIN_GAIN, MAX_GAIN)
}

/// Clamp a binning factor to `1..=3`.
pub fn clamp_bin(bin: u32) -> u32 {
    bin.clamp(1, MAX_BIN)
}

/// Day or night as reported by the solar calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayNight {
    Day,
    Night,
}

impl fmt::Display for DayNight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayNight::Day => write!(f, "DAY"),
            DayNight::Night => write!(f, "NIGHT"),
        }
    }
}

/// The state driving which capture profile is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Day,
    Night,
    /// Calibration frames; overrides day/night entirely.
    DarkFrame,
}

impl From<DayNight> for Classification {
    fn from(value: DayNight) -> Self {
        match value {
            DayNight::Day => Classification::Day,
            DayNight::Night => Classification::Night,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Day => write!(f, "DAY"),
            Classification::Night => write!(f, "NIGHT"),
            Classification::DarkFrame => write!(f, "DARKFRAME"),
        }
    }
}

/// How the shutter time is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Auto,
    Manual,
}

impl ExposureMode {
    pub fn from_auto(auto: bool) -> Self {
        if auto {
            ExposureMode::Auto
        } else {
            ExposureMode::Manual
        }
    }

    pub fn is_auto(self) -> bool {
        self == ExposureMode::Auto
    }
}

/// How the sensor gain is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    Auto,
    Manual,
}

impl GainMode {
    pub fn from_auto(auto: bool) -> Self {
        if auto {
            GainMode::Auto
        } else {
            GainMode::Manual
        }
    }

    pub fn is_auto(self) -> bool {
        self == GainMode::Auto
    }
}

/// White-balance mode and components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhiteBalance {
    pub auto: bool,
    pub red: f64,
    pub blue: f64,
}

impl WhiteBalance {
    /// Components clamped to [`WHITE_BALANCE_RANGE`].
    pub fn clamped(self) -> Self {
        let (lo, hi) = WHITE_BALANCE_RANGE;
        Self {
            auto: self.auto,
            red: self.red.clamp(lo, hi),
            blue: self.blue.clamp(lo, hi),
        }
    }
}

impl Default for WhiteBalance {
    fn default() -> Self {
        Self {
            auto: false,
            red: 2.5,
            blue: 2.0,
        }
    }
}

/// Nominal settings for one period (day or night) before a profile is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSettings {
    pub auto_exposure: bool,
    pub exposure_us: u64,
    pub max_exposure_us: u64,
    pub auto_gain: bool,
    pub gain: f64,
    pub max_gain: f64,
    pub brightness: i32,
    pub bin: u32,
    pub delay: Duration,
    pub target_mean: f64,
}

/// Immutable parameter set used for every capture of one classification period.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProfile {
    pub classification: Classification,
    pub exposure_mode: ExposureMode,
    /// Nominal exposure time in microseconds
    pub exposure_us: u64,
    /// Ceiling for automatically chosen exposures
    pub max_exposure_us: u64,
    pub gain_mode: GainMode,
    /// Nominal gain, already clamped
    pub gain: f64,
    /// Ceiling for automatically chosen gain
    pub max_gain: f64,
    pub brightness: i32,
    pub bin: u32,
    pub white_balance: WhiteBalance,
    /// Nominal inter-capture delay
    pub delay: Duration,
    /// Desired mean brightness when mean-based control is on
    pub target_mean: f64,
}

impl CaptureProfile {
    /// Build a profile for a period, clamping every value to what the camera accepts.
    pub fn from_period(
        classification: Classification,
        period: &PeriodSettings,
        white_balance: WhiteBalance,
    ) -> Self {
        let exposure_us = clamp_shutter_us(period.exposure_us);
        let max_gain = clamp_gain(period.max_gain);
        Self {
            classification,
            exposure_mode: ExposureMode::from_auto(period.auto_exposure),
            exposure_us,
            max_exposure_us: clamp_shutter_us(period.max_exposure_us),
            gain_mode: GainMode::from_auto(period.auto_gain),
            gain: clamp_gain(period.gain),
            max_gain,
            brightness: period.brightness,
            bin: clamp_bin(period.bin),
            white_balance: white_balance.clamped(),
            delay: period.delay,
            target_mean: period.target_mean.clamp(0.0, 1.0),
        }
    }

    /// True when the camera (or the feedback controller) picks any value automatically.
    pub fn has_auto_adjustment(&self) -> bool {
        self.exposure_mode.is_auto() || self.gain_mode.is_auto()
    }
}

/// The day and night profiles built once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSet {
    pub day: CaptureProfile,
    pub night: CaptureProfile,
}

impl ProfileSet {
    pub fn new(day: &PeriodSettings, night: &PeriodSettings, white_balance: WhiteBalance) -> Self {
        Self {
            day: CaptureProfile::from_period(Classification::Day, day, white_balance),
            night: CaptureProfile::from_period(Classification::Night, night, white_balance),
        }
    }

    /// Profile for the given classification.
    pub fn select(&self, classification: Classification) -> CaptureProfile {
        match classification {
            Classification::Day => self.day.clone(),
            Classification::Night => self.night.clone(),
            Classification::DarkFrame => self.dark_frame(),
        }
    }

    /// Night parameters with every automatic adjustment turned off.
    pub fn dark_frame(&self) -> CaptureProfile {
        CaptureProfile {
            classification: Classification::DarkFrame,
            exposure_mode: ExposureMode::Manual,
            gain_mode: GainMode::Manual,
            ..self.night.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(exposure_us: u64, gain: f64) -> PeriodSettings {
        PeriodSettings {
            auto_exposure: true,
            exposure_us,
            max_exposure_us: 60_000_000,
            auto_gain: true,
            gain,
            max_gain: 16.0,
            brightness: 50,
            bin: 1,
            delay: Duration::from_millis(10_000),
            target_mean: 0.3,
        }
    }

    #[test]
    fn test_clamp_shutter_bounds() {
        assert_eq!(clamp_shutter_us(0), 1);
        assert_eq!(clamp_shutter_us(500), 500);
        assert_eq!(clamp_shutter_us(300_000_000), 200_000_000);
    }

    #[test]
    fn test_clamp_gain_bounds() {
        assert_eq!(clamp_gain(0.2), 1.0);
        assert_eq!(clamp_gain(4.0), 4.0);
        assert_eq!(clamp_gain(99.0), 16.0);
        assert_eq!(clamp_gain(f64::NAN), 1.0);
    }

    #[test]
    fn test_clamp_bin() {
        assert_eq!(clamp_bin(0), 1);
        assert_eq!(clamp_bin(2), 2);
        assert_eq!(clamp_bin(8), 3);
    }

    #[test]
    fn test_white_balance_clamped() {
        let wb = WhiteBalance {
            auto: false,
            red: 0.01,
            blue: 42.0,
        }
        .clamped();
        assert_eq!(wb.red, 0.1);
        assert_eq!(wb.blue, 10.0);
    }

    #[test]
    fn test_profile_clamps_period_values() {
        let mut p = period(900_000_000, 40.0);
        p.bin = 7;
        let profile = CaptureProfile::from_period(Classification::Night, &p, WhiteBalance::default());
        assert_eq!(profile.exposure_us, MAX_SHUTTER_US);
        assert_eq!(profile.gain, MAX_GAIN);
        assert_eq!(profile.bin, 3);
    }

    #[test]
    fn test_dark_frame_forces_manual_night_parameters() {
        let set = ProfileSet::new(
            &period(1_000, 1.0),
            &period(5_000_000, 4.0),
            WhiteBalance::default(),
        );
        let dark = set.dark_frame();
        assert_eq!(dark.classification, Classification::DarkFrame);
        assert_eq!(dark.exposure_mode, ExposureMode::Manual);
        assert_eq!(dark.gain_mode, GainMode::Manual);
        assert_eq!(dark.exposure_us, 5_000_000);
        assert_eq!(dark.gain, 4.0);
        assert!(!dark.has_auto_adjustment());
    }

    #[test]
    fn test_select_returns_matching_profile() {
        let set = ProfileSet::new(
            &period(1_000, 1.0),
            &period(5_000_000, 4.0),
            WhiteBalance::default(),
        );
        assert_eq!(set.select(Classification::Day).exposure_us, 1_000);
        assert_eq!(set.select(Classification::Night).exposure_us, 5_000_000);
    }

    #[test]
    fn test_classification_display() {
        assert_eq!(Classification::Day.to_string(), "DAY");
        assert_eq!(Classification::Night.to_string(), "NIGHT");
        assert_eq!(Classification::DarkFrame.to_string(), "DARKFRAME");
        assert_eq!(DayNight::Night.to_string(), "NIGHT");
    }
}
