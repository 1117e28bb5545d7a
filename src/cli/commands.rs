//! Subcommand handlers and run-time overrides.

use chrono::{Local, Utc};
use std::path::Path;

use super::args::{Args, ConfigAction};
use crate::config::{default_path, Config, ConfigError, DEFAULT_CONFIG};
use crate::scheduler::{format_exposure, SchedulerSettings};
use crate::solar::{NoaaSolarCalculator, SolarCalculator};

/// Apply command-line flags on top of the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if args.dark_frames {
        config.dark_frames = true;
    }
    if args.no_daytime {
        config.daytime_capture = false;
    }
    if args.preview {
        config.camera.preview = true;
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) {
    match action {
        ConfigAction::Show => {
            let config = match Config::load(path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match config.to_toml() {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }

            let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found)", config_path.display());
            }
            if let Err(e) = config.validate() {
                println!("# Warning: {}", e);
            }
        }
        ConfigAction::Init => {
            let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

            if config_path.exists() {
                eprintln!("Config file already exists: {}", config_path.display());
                eprintln!("Use 'allsky-capture config show' to view current settings.");
                std::process::exit(1);
            }

            if let Some(parent) = config_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Error creating config directory: {}", e);
                    std::process::exit(1);
                }
            }

            if let Err(e) = std::fs::write(&config_path, DEFAULT_CONFIG) {
                eprintln!(
                    "Error: {}",
                    ConfigError::Write {
                        path: config_path.clone(),
                        source: e,
                    }
                );
                std::process::exit(1);
            }

            println!("Created config file: {}", config_path.display());
        }
    }
}

/// Print the current day/night classification for the configured location.
pub fn show_sun(config: &Config) -> Result<(), ConfigError> {
    let location = config.location()?;
    let mut solar = NoaaSolarCalculator::new(location);
    let now = Utc::now();

    println!(
        "Location: {:.4}, {:.4} (night below {}°)",
        location.latitude, location.longitude, location.angle
    );
    println!("Sun elevation: {:.2}°", solar.elevation(now));
    println!("It is {}", solar.classify(now));
    match solar.time_until_night(now) {
        Some(wait) if wait.is_zero() => {}
        Some(wait) => {
            let at = Local::now() + chrono::Duration::seconds(wait.as_secs() as i64);
            println!(
                "Night starts in {}h{:02}m, at {}",
                wait.as_secs() / 3600,
                (wait.as_secs() % 3600) / 60,
                at.format("%Y-%m-%d %H:%M")
            );
        }
        None => println!("No night within the next 48 hours"),
    }
    Ok(())
}

/// Log the settings the capture loop starts with.
pub fn print_summary(config: &Config, settings: &SchedulerSettings) {
    let on_off = |b: bool| if b { "yes" } else { "no" };
    log::info!("Capture settings:");
    log::info!("  Command: {}", config.camera.command);
    log::info!(
        "  Resolution: {}x{}, image type {}",
        settings.sensor_width,
        settings.sensor_height,
        settings.image_type
    );
    log::info!(
        "  Quality: {}",
        settings
            .output
            .format
            .effective_quality(settings.output.quality, settings.dark_frames)
    );
    for profile in [&settings.profiles.day, &settings.profiles.night] {
        log::info!(
            "  {}: exposure {} (auto {}, max {}), gain {:.2} (auto {}, max {:.2}), bin {}, brightness {}, delay {} ms",
            profile.classification,
            format_exposure(profile.exposure_us),
            on_off(profile.exposure_mode.is_auto()),
            format_exposure(profile.max_exposure_us),
            profile.gain,
            on_off(profile.gain_mode.is_auto()),
            profile.max_gain,
            profile.bin,
            profile.brightness,
            profile.delay.as_millis()
        );
    }
    let wb = settings.profiles.day.white_balance;
    log::info!(
        "  White balance: auto {}, red {:.2}, blue {:.2}",
        on_off(wb.auto),
        wb.red,
        wb.blue
    );
    log::info!(
        "  Rotation: {}, flip: {:?}, saturation {:.1}",
        settings.rotation,
        settings.flip,
        settings.saturation
    );
    if settings.feedback.enabled {
        let c = settings.feedback.coefficients;
        log::info!(
            "  Mean control: threshold {:.3}, p0 {:.3}, p1 {:.3}, p2 {:.3}, targets day {:.3} / night {:.3}",
            settings.feedback.threshold,
            c.p0,
            c.p1,
            c.p2,
            settings.profiles.day.target_mean,
            settings.profiles.night.target_mean
        );
    } else {
        log::info!("  Mean control: off");
    }
    log::info!(
        "  Location: {}, {}, sun angle {}",
        config.location.latitude,
        config.location.longitude,
        config.location.angle
    );
    log::info!("  Daytime capture: {}", on_off(settings.daytime_capture));
    log::info!("  Dark frames: {}", on_off(settings.dark_frames));
    log::info!("  Preview: {}", on_off(settings.preview));
    log::info!(
        "  Notification images: {}",
        on_off(config.output.notification_images)
    );
    log::info!("  Save dir: {}", settings.output.directory.display());
}
