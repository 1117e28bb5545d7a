//! Configuration file handling for allsky-capture.
//!
//! Loads configuration from `~/.config/allsky-capture/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{Flip, ImageFormat, ImageType, DEFAULT_COMMAND, DEFAULT_EXTRA_TIMEOUT};
use crate::exposure::{
    FeedbackSettings, StepCoefficients, DEFAULT_THRESHOLD, MAX_COEFFICIENT, MAX_THRESHOLD,
};
use crate::profile::{PeriodSettings, ProfileSet, WhiteBalance};
use crate::scheduler::{OutputSettings, SchedulerSettings};
use crate::solar::{Location, LocationError};

/// Full sensor size of the HQ camera.
pub const SENSOR_WIDTH: u32 = 4056;
pub const SENSOR_HEIGHT: u32 = 3040;

/// Configuration file structure for allsky-capture.
/// Loaded from ~/.config/allsky-capture/config.toml (or custom path via --config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct Config {
    /// Capture during the day too
    pub daytime_capture: bool,
    /// Take dark frames instead of normal images
    pub dark_frames: bool,
    pub camera: CameraConfig,
    pub day: PeriodConfig,
    pub night: PeriodConfig,
    pub white_balance: WhiteBalanceConfig,
    pub mean: MeanConfig,
    pub location: LocationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture command to run
    pub command: String,
    /// Sensor width before binning
    pub width: u32,
    /// Sensor height before binning
    pub height: u32,
    /// raw8, rgb24, raw16 or auto
    pub image_type: String,
    /// JPEG quality (0-100) or PNG compression (0-9)
    pub quality: Option<u32>,
    /// 0 or 180
    pub rotation: u32,
    /// 0 none, 1 horizontal, 2 vertical, 3 both
    pub flip: u8,
    pub saturation: f64,
    pub preview: bool,
    /// Compute a focus metric for every image
    pub focus_metric: bool,
    /// Seconds allowed beyond the exposure before the capture command is killed
    pub extra_timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            width: SENSOR_WIDTH,
            height: SENSOR_HEIGHT,
            image_type: "auto".to_string(),
            quality: None,
            rotation: 0,
            flip: 0,
            saturation: 1.0,
            preview: false,
            focus_metric: false,
            extra_timeout_secs: DEFAULT_EXTRA_TIMEOUT.as_secs(),
        }
    }
}

/// Settings for one period of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub auto_exposure: bool,
    pub exposure_ms: f64,
    /// Longest exposure auto exposure may choose
    pub max_exposure_ms: f64,
    pub auto_gain: bool,
    pub gain: f64,
    /// Highest gain auto gain may choose
    pub max_gain: f64,
    /// -100 to 100
    pub brightness: i32,
    pub bin: u32,
    /// Pause between captures
    pub delay_ms: u64,
    /// Mean brightness aimed for when mean control is on
    pub target_mean: f64,
}

impl PeriodConfig {
    pub fn day() -> Self {
        Self {
            auto_exposure: true,
            exposure_ms: 0.5,
            max_exposure_ms: 2_000.0,
            auto_gain: false,
            gain: 1.0,
            max_gain: 16.0,
            brightness: 0,
            bin: 1,
            delay_ms: 30_000,
            target_mean: 0.5,
        }
    }

    pub fn night() -> Self {
        Self {
            auto_exposure: true,
            exposure_ms: 10_000.0,
            max_exposure_ms: 20_000.0,
            auto_gain: true,
            gain: 4.0,
            max_gain: 16.0,
            brightness: 0,
            bin: 1,
            delay_ms: 10,
            target_mean: 0.2,
        }
    }

    fn to_settings(&self) -> PeriodSettings {
        PeriodSettings {
            auto_exposure: self.auto_exposure,
            exposure_us: ms_to_us(self.exposure_ms),
            max_exposure_us: ms_to_us(self.max_exposure_ms),
            auto_gain: self.auto_gain,
            gain: self.gain,
            max_gain: self.max_gain,
            brightness: self.brightness,
            bin: self.bin,
            delay: Duration::from_millis(self.delay_ms),
            target_mean: self.target_mean,
        }
    }
}

fn ms_to_us(ms: f64) -> u64 {
    (ms * 1000.0).round().max(0.0) as u64
}

/// White balance, shared by day and night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteBalanceConfig {
    pub auto: bool,
    pub red: f64,
    pub blue: f64,
}

impl Default for WhiteBalanceConfig {
    fn default() -> Self {
        let wb = WhiteBalance::default();
        Self {
            auto: wb.auto,
            red: wb.red,
            blue: wb.blue,
        }
    }
}

/// Mean-brightness exposure control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanConfig {
    pub enabled: bool,
    /// Allowed distance from the target mean
    pub threshold: f64,
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Default for MeanConfig {
    fn default() -> Self {
        let c = StepCoefficients::default();
        Self {
            enabled: false,
            threshold: DEFAULT_THRESHOLD,
            p0: c.p0,
            p1: c.p1,
            p2: c.p2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// e.g. "60.7N" or "-33.9"
    pub latitude: String,
    /// e.g. "135.05W" or "18.4"
    pub longitude: String,
    /// Sun elevation in degrees below which it is night
    pub angle: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: "60.7N".to_string(),
            longitude: "135.05W".to_string(),
            angle: "-6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub save_dir: PathBuf,
    /// Base name and extension of saved images
    pub filename: String,
    /// Show status images (dark frames, not running, ...) in place of captures
    pub notification_images: bool,
    /// Directory holding saveImage.sh and friends
    pub scripts_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("tmp"),
            filename: "image.jpg".to_string(),
            notification_images: true,
            scripts_dir: PathBuf::from("scripts"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daytime_capture: true,
            dark_frames: false,
            camera: CameraConfig::default(),
            day: PeriodConfig::day(),
            night: PeriodConfig::night(),
            white_balance: WhiteBalanceConfig::default(),
            mean: MeanConfig::default(),
            location: LocationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// On-disk form. Keys missing from `[day]` or `[night]` fall back to that
/// period's own defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    daytime_capture: Option<bool>,
    dark_frames: bool,
    camera: CameraConfig,
    day: PeriodOverrides,
    night: PeriodOverrides,
    white_balance: WhiteBalanceConfig,
    mean: MeanConfig,
    location: LocationConfig,
    output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PeriodOverrides {
    auto_exposure: Option<bool>,
    exposure_ms: Option<f64>,
    max_exposure_ms: Option<f64>,
    auto_gain: Option<bool>,
    gain: Option<f64>,
    max_gain: Option<f64>,
    brightness: Option<i32>,
    bin: Option<u32>,
    delay_ms: Option<u64>,
    target_mean: Option<f64>,
}

impl PeriodOverrides {
    fn apply(self, base: PeriodConfig) -> PeriodConfig {
        PeriodConfig {
            auto_exposure: self.auto_exposure.unwrap_or(base.auto_exposure),
            exposure_ms: self.exposure_ms.unwrap_or(base.exposure_ms),
            max_exposure_ms: self.max_exposure_ms.unwrap_or(base.max_exposure_ms),
            auto_gain: self.auto_gain.unwrap_or(base.auto_gain),
            gain: self.gain.unwrap_or(base.gain),
            max_gain: self.max_gain.unwrap_or(base.max_gain),
            brightness: self.brightness.unwrap_or(base.brightness),
            bin: self.bin.unwrap_or(base.bin),
            delay_ms: self.delay_ms.unwrap_or(base.delay_ms),
            target_mean: self.target_mean.unwrap_or(base.target_mean),
        }
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            daytime_capture: file.daytime_capture.unwrap_or(true),
            dark_frames: file.dark_frames,
            camera: file.camera,
            day: file.day.apply(PeriodConfig::day()),
            night: file.night.apply(PeriodConfig::night()),
            white_balance: file.white_balance,
            mean: file.mean,
            location: file.location,
            output: file.output,
        }
    }
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file '{}' not found", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid location: {0}")]
    Location(#[from] LocationError),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if no path is given and the default file doesn't exist.
    /// Returns an error if an explicit path doesn't exist or a file cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound { path });
            }
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::Parse { path, source: e })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check everything the capture loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler_settings()?;
        self.location()?;
        Ok(())
    }

    pub fn image_format(&self) -> Result<ImageFormat, ConfigError> {
        let ext = Path::new(&self.output.filename)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| invalid("output.filename", "missing extension"))?;
        ImageFormat::from_extension(ext).ok_or_else(|| {
            invalid(
                "output.filename",
                format!("unsupported extension '{}', use jpg or png", ext),
            )
        })
    }

    pub fn image_type(&self) -> Result<ImageType, ConfigError> {
        ImageType::parse(&self.camera.image_type).ok_or_else(|| {
            invalid(
                "camera.image_type",
                format!(
                    "'{}', use raw8, rgb24, raw16 or auto",
                    self.camera.image_type
                ),
            )
        })
    }

    pub fn flip(&self) -> Result<Flip, ConfigError> {
        Flip::from_code(self.camera.flip)
            .ok_or_else(|| invalid("camera.flip", format!("{}, use 0-3", self.camera.flip)))
    }

    pub fn white_balance(&self) -> WhiteBalance {
        WhiteBalance {
            auto: self.white_balance.auto,
            red: self.white_balance.red,
            blue: self.white_balance.blue,
        }
        .clamped()
    }

    pub fn feedback(&self) -> Result<FeedbackSettings, ConfigError> {
        let threshold = self.mean.threshold;
        if !(threshold > 0.0 && threshold <= MAX_THRESHOLD) {
            return Err(invalid(
                "mean.threshold",
                format!("{} is outside (0, {}]", threshold, MAX_THRESHOLD),
            ));
        }
        for (field, value) in [
            ("mean.p0", self.mean.p0),
            ("mean.p1", self.mean.p1),
            ("mean.p2", self.mean.p2),
        ] {
            if !(0.0..=MAX_COEFFICIENT).contains(&value) {
                return Err(invalid(
                    field,
                    format!("{} is outside [0, {}]", value, MAX_COEFFICIENT),
                ));
            }
        }
        Ok(FeedbackSettings {
            enabled: self.mean.enabled,
            threshold,
            coefficients: StepCoefficients {
                p0: self.mean.p0,
                p1: self.mean.p1,
                p2: self.mean.p2,
            },
        })
    }

    pub fn profiles(&self) -> Result<ProfileSet, ConfigError> {
        for (field, period) in [
            ("day.target_mean", &self.day),
            ("night.target_mean", &self.night),
        ] {
            if !(0.0..=1.0).contains(&period.target_mean) {
                return Err(invalid(
                    field,
                    format!("{} is outside [0, 1]", period.target_mean),
                ));
            }
        }
        Ok(ProfileSet::new(
            &self.day.to_settings(),
            &self.night.to_settings(),
            self.white_balance(),
        ))
    }

    pub fn location(&self) -> Result<Location, ConfigError> {
        Ok(Location::parse(
            &self.location.latitude,
            &self.location.longitude,
            &self.location.angle,
        )?)
    }

    pub fn extra_timeout(&self) -> Duration {
        Duration::from_secs(self.camera.extra_timeout_secs)
    }

    /// Build the capture loop's settings, validating along the way.
    pub fn scheduler_settings(&self) -> Result<SchedulerSettings, ConfigError> {
        let format = self.image_format()?;
        let file_stem = Path::new(&self.output.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("output.filename", "missing file name"))?
            .to_string();

        let rotation = match self.camera.rotation {
            0 | 180 => self.camera.rotation,
            other => {
                log::warn!("Rotation {} is not supported, using 0", other);
                0
            }
        };

        Ok(SchedulerSettings {
            profiles: self.profiles()?,
            feedback: self.feedback()?,
            daytime_capture: self.daytime_capture,
            dark_frames: self.dark_frames,
            output: OutputSettings {
                directory: self.output.save_dir.clone(),
                file_stem,
                format,
                quality: self.camera.quality,
            },
            image_type: self.image_type()?,
            sensor_width: self.camera.width,
            sensor_height: self.camera.height,
            rotation,
            flip: self.flip()?,
            saturation: self.camera.saturation,
            preview: self.camera.preview,
            focus_metric: self.camera.focus_metric,
        })
    }
}

/// Commented default configuration written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# allsky-capture configuration

# Capture during the day too (false = wait for night)
daytime_capture = true
# Take dark frames instead of normal images
dark_frames = false

[camera]
command = "libcamera-still"
# Sensor size before binning
width = 4056
height = 3040
# raw8, rgb24, raw16 or auto
image_type = "auto"
# JPEG quality (0-100) or PNG compression (0-9); default 95 / 3
# quality = 95
# 0 or 180
rotation = 0
# 0 none, 1 horizontal, 2 vertical, 3 both
flip = 0
saturation = 1.0
preview = false
focus_metric = false
extra_timeout_secs = 60

[day]
auto_exposure = true
exposure_ms = 0.5
max_exposure_ms = 2000.0
auto_gain = false
gain = 1.0
max_gain = 16.0
brightness = 0
bin = 1
delay_ms = 30000
target_mean = 0.5

[night]
auto_exposure = true
exposure_ms = 10000.0
max_exposure_ms = 20000.0
auto_gain = true
gain = 4.0
max_gain = 16.0
brightness = 0
bin = 1
delay_ms = 10
target_mean = 0.2

# Used both day and night
[white_balance]
auto = false
red = 2.5
blue = 2.0

# Adjust exposure from the measured mean brightness
[mean]
enabled = false
threshold = 0.05
p0 = 0.0
p1 = 5.0
p2 = 2.0

[location]
latitude = "60.7N"
longitude = "135.05W"
# Sun elevation below which it is night: 0, -6, -12 or -18
angle = "-6"

[output]
save_dir = "tmp"
filename = "image.jpg"
notification_images = true
scripts_dir = "scripts"
"#;

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("allsky-capture").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/allsky-capture/config.toml")
        })
}
