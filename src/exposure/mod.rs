//! Closed-loop exposure control.
//!
//! - [`ExposureController`] owns the feedback state and turns a measured mean
//!   brightness into the next shutter/gain setting.
//! - [`FeedbackSettings`] and [`StepCoefficients`] are the configuration of
//!   the mean-based control.

mod controller;

pub use controller::{
    Adjustment, ExposureController, ExposureSetting, FeedbackSettings, StepCoefficients, DEFAULT_THRESHOLD, MAX_COEFFICIENT, MAX_THRESHOLD,
};
