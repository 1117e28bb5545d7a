//! Fire-and-forget side effects: saving images, notification images, and
//! end-of-night processing.
//!
//! The capture loop describes what should happen with a [`SideEffect`] and
//! hands it to a [`SideEffects`] implementation. [`ScriptDispatcher`] runs the
//! matching shell script as a detached process; [`RecordingDispatcher`] just
//! remembers what was dispatched.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use crate::camera::Flip;
use crate::profile::{DayNight, WhiteBalance};

/// Script that files a captured image.
pub const SAVE_IMAGE_SCRIPT: &str = "saveImage.sh";

/// Script that replaces the latest image with a status image.
pub const NOTIFICATION_SCRIPT: &str = "copy_notification_image.sh";

/// Script run once when a night ends.
pub const END_OF_NIGHT_SCRIPT: &str = "endOfNight.sh";

/// Status images shown in place of the latest capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationImage {
    DarkFrames,
    CameraOffDuringDay,
    NotRunning,
    Restarting,
}

impl NotificationImage {
    pub fn name(self) -> &'static str {
        match self {
            NotificationImage::DarkFrames => "DarkFrames",
            NotificationImage::CameraOffDuringDay => "CameraOffDuringDay",
            NotificationImage::NotRunning => "NotRunning",
            NotificationImage::Restarting => "Restarting",
        }
    }

    /// Seconds the image stays before normal images may replace it (0 = until replaced).
    pub fn expires_secs(self) -> u32 {
        match self {
            NotificationImage::DarkFrames | NotificationImage::CameraOffDuringDay => 0,
            NotificationImage::NotRunning => 2,
            NotificationImage::Restarting => 15,
        }
    }
}

/// Settings a capture was taken with, passed along to the save script.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMetadata {
    pub exposure_us: u64,
    pub brightness: i32,
    /// Measured mean, `None` when mean-based control is off
    pub mean: Option<f64>,
    pub auto_exposure: bool,
    pub auto_gain: bool,
    pub white_balance: WhiteBalance,
    pub gain: f64,
    pub bin: u32,
    pub flip: Flip,
    pub bit_depth: u32,
    /// Focus metric, `None` when the image could not be analyzed
    pub focus: Option<f64>,
}

impl CaptureMetadata {
    /// Gain expressed the way the save scripts expect it (tenths of a dB).
    pub fn gain_db(&self) -> i64 {
        (20.0 * 10.0 * self.gain.log10()).round() as i64
    }

    /// Key/value form handed to the save script.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let flag = |b: bool| (if b { "1" } else { "0" }).to_string();
        let mut map = BTreeMap::new();
        map.insert("EXPOSURE_US", self.exposure_us.to_string());
        map.insert("BRIGHTNESS", self.brightness.to_string());
        map.insert(
            "MEAN",
            self.mean
                .map(|m| format!("{:.3}", m))
                .unwrap_or_else(|| "-1".to_string()),
        );
        map.insert("AUTOEXPOSURE", flag(self.auto_exposure));
        map.insert("AUTOGAIN", flag(self.auto_gain));
        map.insert("AUTOWB", flag(self.white_balance.auto));
        map.insert("WBR", format!("{:.2}", self.white_balance.red));
        map.insert("WBB", format!("{:.2}", self.white_balance.blue));
        map.insert("GAIN", format!("{:.2}", self.gain));
        map.insert("GAINDB", self.gain_db().to_string());
        map.insert("BIN", self.bin.to_string());
        map.insert("FLIP", self.flip.code().to_string());
        map.insert("BIT_DEPTH", self.bit_depth.to_string());
        map.insert(
            "FOCUS",
            self.focus
                .map(|f| f.round().to_string())
                .unwrap_or_else(|| "-1".to_string()),
        );
        map
    }
}

/// Descriptor of one side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    SaveImage {
        day_or_night: DayNight,
        path: PathBuf,
        metadata: CaptureMetadata,
    },
    Notification(NotificationImage),
    EndOfNight,
}

/// Dispatches side effects without waiting for them.
pub trait SideEffects {
    fn dispatch(&self, effect: SideEffect);
}

/// Runs the matching script from a scripts directory as a detached process.
#[derive(Debug, Clone)]
pub struct ScriptDispatcher {
    scripts_dir: PathBuf,
    notification_images: bool,
}

impl ScriptDispatcher {
    pub fn new(scripts_dir: impl Into<PathBuf>, notification_images: bool) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            notification_images,
        }
    }

    /// Script path and arguments for an effect, `None` if it is suppressed.
    pub fn script_for(&self, effect: &SideEffect) -> Option<(PathBuf, Vec<String>)> {
        match effect {
            SideEffect::SaveImage {
                day_or_night,
                path,
                metadata,
            } => {
                let mut args = vec![day_or_night.to_string(), path.display().to_string()];
                args.extend(
                    metadata
                        .to_map()
                        .into_iter()
                        .map(|(k, v)| format!("{}={}", k, v)),
                );
                Some((self.scripts_dir.join(SAVE_IMAGE_SCRIPT), args))
            }
            SideEffect::Notification(image) => {
                if !self.notification_images {
                    return None;
                }
                Some((
                    self.scripts_dir.join(NOTIFICATION_SCRIPT),
                    vec![
                        "--expires".to_string(),
                        image.expires_secs().to_string(),
                        image.name().to_string(),
                    ],
                ))
            }
            SideEffect::EndOfNight => Some((self.scripts_dir.join(END_OF_NIGHT_SCRIPT), Vec::new())),
        }
    }
}

impl SideEffects for ScriptDispatcher {
    fn dispatch(&self, effect: SideEffect) {
        let Some((script, args)) = self.script_for(&effect) else {
            return;
        };
        log::debug!("Running {} {}", script.display(), args.join(" "));

        match Command::new(&script)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(mut child) => {
                // Reap in the background; the result is never reported back.
                thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => log::warn!("Unable to run '{}': {}", script.display(), e),
        }
    }
}

/// Records dispatched effects instead of running anything.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    effects: RefCell<Vec<SideEffect>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order.
    pub fn effects(&self) -> Vec<SideEffect> {
        self.effects.borrow().clone()
    }

    /// Number of dispatched effects matching a predicate.
    pub fn count(&self, predicate: impl Fn(&SideEffect) -> bool) -> usize {
        self.effects.borrow().iter().filter(|e| predicate(e)).count()
    }
}

impl SideEffects for RecordingDispatcher {
    fn dispatch(&self, effect: SideEffect) {
        self.effects.borrow_mut().push(effect);
    }
}
