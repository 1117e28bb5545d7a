//! allsky-capture library crate.
//!
//! Adaptive capture loop for an all-sky camera: picks day, night or
//! dark-frame settings from the sun's position, steers exposure from the
//! measured image brightness and keeps capturing through failures.

pub mod analysis;
pub mod camera;
pub mod cli;
pub mod clock;
pub mod config;
pub mod effects;
pub mod exposure;
pub mod profile;
pub mod scheduler;
pub mod signals;
pub mod solar;
