//! Capture operation for the all-sky camera.
//!
//! This module provides the seam between the capture loop and the camera:
//! - The [`CaptureOperation`] trait, taking typed [`CaptureParams`]
//! - The [`LibcameraStill`] adapter that runs the external capture tool
//! - Image format and type settings via [`ImageFormat`] and [`ImageType`]

mod libcamera;
mod types;

pub use libcamera::{LibcameraStill, DEFAULT_COMMAND, DEFAULT_EXTRA_TIMEOUT};
pub use types::{
    CaptureError, CaptureOperation, CaptureParams, CapturedImage, Flip, ImageFormat, ImageType,
    ToolExit,
};
