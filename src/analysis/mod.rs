//! Image statistics used by the capture loop.

mod focus;
mod mean;

pub use focus::focus_metric;
pub use mean::{luma_mean, LumaMeanEstimator, MeanEstimator, MeasurementContext};
