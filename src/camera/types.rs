//! Capture parameter and result types.

use image::DynamicImage;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::profile::{Classification, WhiteBalance};

/// Encoded file format of saved images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Parse a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    /// Quality (JPEG) or compression level (PNG) actually used.
    ///
    /// Dark frames always use the lossless/best setting.
    pub fn effective_quality(self, requested: Option<u32>, dark_frames: bool) -> u32 {
        let (default, max) = match self {
            ImageFormat::Jpeg => (95, 100),
            ImageFormat::Png => (3, 9),
        };
        if dark_frames {
            return max;
        }
        requested.map(|q| q.min(max)).unwrap_or(default)
    }
}

/// Pixel layout requested from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Raw8,
    Rgb24,
    Raw16,
}

impl ImageType {
    /// Parse a configured image type. `auto` selects RGB24.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" | "rgb24" => Some(ImageType::Rgb24),
            "raw8" => Some(ImageType::Raw8),
            "raw16" => Some(ImageType::Raw16),
            _ => None,
        }
    }

    pub fn bit_depth(self) -> u32 {
        match self {
            ImageType::Raw16 => 16,
            ImageType::Raw8 | ImageType::Rgb24 => 8,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ImageType::Raw8 => 1,
            ImageType::Raw16 => 2,
            ImageType::Rgb24 => 3,
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageType::Raw8 => write!(f, "RAW8"),
            ImageType::Rgb24 => write!(f, "RGB24"),
            ImageType::Raw16 => write!(f, "RAW16"),
        }
    }
}

/// Horizontal/vertical image flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Flip {
    /// Map the numeric setting (0 none, 1 horizontal, 2 vertical, 3 both).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Flip::None),
            1 => Some(Flip::Horizontal),
            2 => Some(Flip::Vertical),
            3 => Some(Flip::Both),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Flip::None => 0,
            Flip::Horizontal => 1,
            Flip::Vertical => 2,
            Flip::Both => 3,
        }
    }

    pub fn horizontal(self) -> bool {
        matches!(self, Flip::Horizontal | Flip::Both)
    }

    pub fn vertical(self) -> bool {
        matches!(self, Flip::Vertical | Flip::Both)
    }
}

/// Everything one capture needs, independent of any tool's argument syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureParams {
    pub classification: Classification,
    pub auto_exposure: bool,
    pub exposure_us: u64,
    pub auto_gain: bool,
    pub gain: f64,
    /// Exposure and gain come from the feedback controller, not the camera
    pub feedback_driven: bool,
    pub bin: u32,
    pub white_balance: WhiteBalance,
    pub rotation: u32,
    pub flip: Flip,
    pub saturation: f64,
    pub brightness: i32,
    pub quality: u32,
    pub output: PathBuf,
    pub dark_frame: bool,
    pub preview: bool,
    pub width: u32,
    pub height: u32,
}

/// A finished capture.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub path: PathBuf,
    /// Decoded image, `None` when the file could not be decoded
    pub image: Option<DynamicImage>,
}

/// How the capture tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    pub code: Option<i32>,
    /// Terminating signal, if the tool was killed by one
    pub signal: Option<i32>,
}

impl From<std::process::ExitStatus> for ToolExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ToolExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (_, Some(sig)) => write!(f, "signal {}", sig),
            (Some(code), None) => write!(f, "exit code {}", code),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Errors that can occur while running the capture operation.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture command '{command}' not found")]
    ToolNotFound { command: String },

    #[error("Failed to start capture command '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture command failed with {status}")]
    ToolFailed { status: ToolExit },

    #[error("Capture command did not finish within {after:?}")]
    TimedOut { after: Duration },

    #[error("I/O error while waiting for capture: {0}")]
    Io(#[from] std::io::Error),
}

/// Takes one picture for a parameter set.
///
/// Implementations block for the full duration of the exposure.
pub trait CaptureOperation {
    fn capture(&mut self, params: &CaptureParams) -> Result<CapturedImage, CaptureError>;
}
