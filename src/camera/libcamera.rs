//! `libcamera-still` capture adapter.
//!
//! Maps [`CaptureParams`] onto the tool's command-line syntax, runs it to
//! completion (with a deadline) and decodes the written file.

use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::types::{
    CaptureError, CaptureOperation, CaptureParams, CapturedImage, ImageFormat, ToolExit,
};
use crate::profile::Classification;

/// Default capture command.
pub const DEFAULT_COMMAND: &str = "libcamera-still";

/// Slack added on top of exposure and settle time before the tool is killed.
pub const DEFAULT_EXTRA_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between checks on the running tool.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs `libcamera-still` as the capture operation.
#[derive(Debug, Clone)]
pub struct LibcameraStill {
    command: String,
    extra_timeout: Duration,
}

impl Default for LibcameraStill {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND)
    }
}

impl LibcameraStill {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            extra_timeout: DEFAULT_EXTRA_TIMEOUT,
        }
    }

    /// Set the slack added to the expected capture duration.
    pub fn with_extra_timeout(mut self, extra: Duration) -> Self {
        self.extra_timeout = extra;
        self
    }

    /// How long the camera runs before taking the picture, in milliseconds.
    pub fn settle_ms(params: &CaptureParams) -> u64 {
        if params.preview {
            5_000
        } else if params.auto_exposure {
            if params.feedback_driven {
                // Exposure is already chosen; no need to wait at all.
                1
            } else if params.classification == Classification::Day {
                2_000
            } else {
                10_000
            }
        } else {
            10
        }
    }

    /// Generate the tool's command-line arguments.
    pub fn build_args(params: &CaptureParams) -> Vec<String> {
        let mut args = vec![
            "--output".to_string(),
            params.output.display().to_string(),
            "--timeout".to_string(),
            Self::settle_ms(params).to_string(),
        ];

        if params.preview {
            args.push("--preview".to_string());
            args.push(format!("0,0,{},{}", params.width, params.height));
        } else {
            args.push("--nopreview".to_string());
        }

        args.push("--width".to_string());
        args.push(params.width.to_string());
        args.push("--height".to_string());
        args.push(params.height.to_string());

        // Shutter 0 lets libcamera choose the exposure itself.
        let shutter = if params.auto_exposure && !params.feedback_driven {
            0
        } else {
            params.exposure_us
        };
        args.push("--shutter".to_string());
        args.push(shutter.to_string());

        // Gain 1 lets libcamera choose the gain itself.
        let gain = if params.auto_gain && !params.feedback_driven {
            1.0
        } else {
            params.gain
        };
        args.push("--gain".to_string());
        args.push(format_decimal(gain));

        // Giving explicit red/blue gains turns AWB off.
        let wb = params.white_balance;
        if wb.auto {
            args.push("--awb".to_string());
            args.push("auto".to_string());
        } else {
            args.push("--awbgains".to_string());
            args.push(format!("{},{}", format_decimal(wb.red), format_decimal(wb.blue)));
        }

        // libcamera only rotates by 0 or 180 degrees.
        if params.rotation == 180 {
            args.push("--rotation".to_string());
            args.push("180".to_string());
        }
        if params.flip.horizontal() {
            args.push("--hflip".to_string());
        }
        if params.flip.vertical() {
            args.push("--vflip".to_string());
        }

        args.push("--saturation".to_string());
        args.push(format_decimal(params.saturation.clamp(0.0, 2.0)));

        // Brightness is configured as -100..=100; libcamera wants -1.0..=1.0.
        let brightness = params.brightness.clamp(-100, 100) as f64 / 100.0;
        args.push("--brightness".to_string());
        args.push(format_decimal(brightness));

        let format = params
            .output
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .unwrap_or(ImageFormat::Jpeg);
        args.push("--encoding".to_string());
        args.push(format.extension().to_string());

        args.push("--quality".to_string());
        args.push(params.quality.to_string());

        args
    }

    /// Longest the tool may run for these parameters.
    fn deadline(&self, params: &CaptureParams) -> Duration {
        Duration::from_micros(params.exposure_us)
            + Duration::from_millis(Self::settle_ms(params))
            + self.extra_timeout
    }
}

impl CaptureOperation for LibcameraStill {
    fn capture(&mut self, params: &CaptureParams) -> Result<CapturedImage, CaptureError> {
        let args = Self::build_args(params);
        log::debug!("Capture command: {} {}", self.command, args.join(" "));

        let mut child = Command::new(&self.command)
            .args(&args)
            .env("LIBCAMERA_LOG_LEVELS", "ERROR,FATAL")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CaptureError::ToolNotFound {
                        command: self.command.clone(),
                    }
                } else {
                    CaptureError::SpawnFailed {
                        command: self.command.clone(),
                        source: e,
                    }
                }
            })?;

        let status = wait_with_deadline(&mut child, self.deadline(params))?;

        if !status.success() {
            return Err(CaptureError::ToolFailed {
                status: ToolExit::from(status),
            });
        }

        let image = match image::open(&params.output) {
            Ok(img) => Some(img),
            Err(e) => {
                log::warn!(
                    "Error re-reading file '{}': {}; skipping further processing",
                    params.output.display(),
                    e
                );
                None
            }
        };

        Ok(CapturedImage {
            path: params.output.clone(),
            image,
        })
    }
}

/// Wait for the tool to exit, killing it once `deadline` has passed.
///
/// The child is always reaped before an error is returned.
fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Result<ExitStatus, CaptureError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if start.elapsed() > deadline => {
                stop_child(child);
                return Err(CaptureError::TimedOut { after: deadline });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                stop_child(child);
                return Err(e.into());
            }
        }
    }
}

fn stop_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Format a float without trailing zeros (`2.5`, `4`, `0.25`).
fn format_decimal(value: f64) -> String {
    let s = format!("{:.3}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
