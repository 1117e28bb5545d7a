//! Integration tests for loading configuration files from disk.

use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use allsky_capture::camera::{ImageFormat, ImageType};
use allsky_capture::config::{Config, ConfigError, DEFAULT_CONFIG};
use allsky_capture::profile::{Classification, ExposureMode};

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
daytime_capture = false

[camera]
image_type = "raw16"
quality = 7
flip = 3

[day]
exposure_ms = 2.5
delay_ms = 15000

[night]
auto_exposure = false
exposure_ms = 25000
bin = 2

[mean]
enabled = true
threshold = 0.08

[location]
latitude = "33.9S"
longitude = "18.4E"
angle = "-12"

[output]
filename = "sky.png"
save_dir = "/var/allsky"
"#,
    );

    let config = Config::load(Some(&path)).unwrap();
    assert!(!config.daytime_capture);
    assert!(config.validate().is_ok());

    let settings = config.scheduler_settings().unwrap();
    assert_eq!(settings.image_type, ImageType::Raw16);
    assert_eq!(settings.output.format, ImageFormat::Png);
    assert_eq!(settings.output.file_stem, "sky");
    assert_eq!(settings.output.quality, Some(7));
    assert_eq!(settings.profiles.day.exposure_us, 2_500);
    assert_eq!(settings.profiles.day.delay, Duration::from_millis(15_000));
    assert_eq!(settings.profiles.night.exposure_us, 25_000_000);
    assert_eq!(settings.profiles.night.exposure_mode, ExposureMode::Manual);
    assert_eq!(settings.profiles.select(Classification::Night).bin, 2);
    assert!(settings.feedback.enabled);
    assert_eq!(settings.feedback.threshold, 0.08);

    let location = config.location().unwrap();
    assert!(location.latitude < 0.0);
    assert_eq!(location.angle, -12.0);
}

#[test]
fn test_default_template_loads() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, DEFAULT_CONFIG);
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");
    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::NotFound { .. })
    ));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[night\nexposure_ms = ");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.toml"));
}

#[test]
fn test_wrong_type_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[night]\ndelay_ms = \"soon\"\n");
    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[mean]\nthreshold = 0.5\n");
    let config = Config::load(Some(&path)).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("mean.threshold"));
}
