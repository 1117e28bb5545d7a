//! Day/night classification from the sun's position.
//!
//! The capture loop only sees the [`SolarCalculator`] trait. The built-in
//! [`NoaaSolarCalculator`] uses the low-precision solar almanac formulas,
//! good to a small fraction of a degree, which is plenty for picking
//! exposure profiles.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::profile::DayNight;

/// How far ahead to look for the next night.
pub const NIGHT_SEARCH_HORIZON: Duration = Duration::from_secs(48 * 3600);

/// Resolution of the search for the next night.
const NIGHT_SEARCH_STEP_SECS: i64 = 60;

/// Answers whether it is day or night, and how long until night.
pub trait SolarCalculator {
    fn classify(&mut self, at: DateTime<Utc>) -> DayNight;

    /// Time remaining until night starts; zero if it is already night,
    /// `None` if night does not begin within the search horizon.
    fn time_until_night(&mut self, at: DateTime<Utc>) -> Option<Duration>;
}

/// Which coordinate failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Latitude => write!(f, "latitude"),
            Axis::Longitude => write!(f, "longitude"),
        }
    }
}

/// Errors that can occur when parsing an observer location.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LocationError {
    #[error("Invalid {axis} '{value}'. Use decimal degrees like 60.7N or -135.05")]
    InvalidCoordinate { axis: Axis, value: String },

    #[error("{axis} {value} is out of range")]
    OutOfRange { axis: Axis, value: f64 },

    #[error("Invalid sun angle '{0}'")]
    InvalidAngle(String),
}

/// Observer position and the sun elevation that separates day from night.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Degrees, north positive
    pub latitude: f64,
    /// Degrees, east positive
    pub longitude: f64,
    /// Sun elevation below which it is night (0 sunset, -6 civil, -12 nautical, -18 astronomical)
    pub angle: f64,
}

impl Location {
    /// Parse configured coordinate strings.
    ///
    /// Accepts signed decimals (`-33.9`) or hemisphere suffixes (`60.7N`, `135.05W`).
    pub fn parse(latitude: &str, longitude: &str, angle: &str) -> Result<Self, LocationError> {
        let latitude = parse_coordinate(latitude, Axis::Latitude)?;
        let longitude = parse_coordinate(longitude, Axis::Longitude)?;
        let angle = angle
            .trim()
            .parse::<f64>()
            .map_err(|_| LocationError::InvalidAngle(angle.to_string()))?;
        Ok(Self {
            latitude,
            longitude,
            angle,
        })
    }
}

fn parse_coordinate(value: &str, axis: Axis) -> Result<f64, LocationError> {
    let invalid = || LocationError::InvalidCoordinate {
        axis,
        value: value.to_string(),
    };
    let trimmed = value.trim();
    let last = trimmed.chars().last().ok_or_else(invalid)?;

    let (number, sign) = match (axis, last.to_ascii_uppercase()) {
        (Axis::Latitude, 'N') | (Axis::Longitude, 'E') => (&trimmed[..trimmed.len() - 1], 1.0),
        (Axis::Latitude, 'S') | (Axis::Longitude, 'W') => (&trimmed[..trimmed.len() - 1], -1.0),
        (_, c) if c.is_ascii_digit() || c == '.' => (trimmed, 1.0),
        _ => return Err(invalid()),
    };

    let degrees = number.trim().parse::<f64>().map_err(|_| invalid())? * sign;
    let limit = match axis {
        Axis::Latitude => 90.0,
        Axis::Longitude => 180.0,
    };
    if !degrees.is_finite() || degrees.abs() > limit {
        return Err(LocationError::OutOfRange {
            axis,
            value: degrees,
        });
    }
    Ok(degrees)
}

/// Sun elevation above the horizon, in degrees, for a location and instant.
pub fn solar_elevation_deg(latitude: f64, longitude: f64, at: DateTime<Utc>) -> f64 {
    let unix = at.timestamp() as f64 + at.timestamp_subsec_millis() as f64 / 1000.0;
    // Days since J2000.0
    let n = unix / 86_400.0 + 2_440_587.5 - 2_451_545.0;

    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

    let right_ascension = (obliquity.cos() * ecliptic_longitude.sin())
        .atan2(ecliptic_longitude.cos())
        .to_degrees();
    let declination = (obliquity.sin() * ecliptic_longitude.sin()).asin();

    let gmst_hours = (18.697_374_558 + 24.065_709_824_419_08 * n).rem_euclid(24.0);
    let hour_angle = (gmst_hours * 15.0 + longitude - right_ascension).to_radians();

    let lat = latitude.to_radians();
    let sin_elevation =
        lat.sin() * declination.sin() + lat.cos() * declination.cos() * hour_angle.cos();
    sin_elevation.clamp(-1.0, 1.0).asin().to_degrees()
}

/// Solar calculator for a fixed [`Location`].
#[derive(Debug, Clone, Copy)]
pub struct NoaaSolarCalculator {
    location: Location,
}

impl NoaaSolarCalculator {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    pub fn elevation(&self, at: DateTime<Utc>) -> f64 {
        solar_elevation_deg(self.location.latitude, self.location.longitude, at)
    }

    fn is_night(&self, at: DateTime<Utc>) -> bool {
        self.elevation(at) < self.location.angle
    }
}

impl SolarCalculator for NoaaSolarCalculator {
    fn classify(&mut self, at: DateTime<Utc>) -> DayNight {
        if self.is_night(at) {
            DayNight::Night
        } else {
            DayNight::Day
        }
    }

    fn time_until_night(&mut self, at: DateTime<Utc>) -> Option<Duration> {
        if self.is_night(at) {
            return Some(Duration::ZERO);
        }
        let steps = NIGHT_SEARCH_HORIZON.as_secs() as i64 / NIGHT_SEARCH_STEP_SECS;
        (1..=steps)
            .map(|i| i * NIGHT_SEARCH_STEP_SECS)
            .find(|secs| self.is_night(at + chrono::Duration::seconds(*secs)))
            .map(|secs| Duration::from_secs(secs as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_hemisphere_suffixes() {
        let loc = Location::parse("60.7N", "135.05W", "-6").unwrap();
        assert!((loc.latitude - 60.7).abs() < 1e-9);
        assert!((loc.longitude + 135.05).abs() < 1e-9);
        assert_eq!(loc.angle, -6.0);
    }

    #[test]
    fn test_parse_signed_decimals() {
        let loc = Location::parse("-33.9", "18.4", "0").unwrap();
        assert!((loc.latitude + 33.9).abs() < 1e-9);
        assert!((loc.longitude - 18.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_south_and_east() {
        let loc = Location::parse("33.9s", "18.4e", "-12").unwrap();
        assert!(loc.latitude < 0.0);
        assert!(loc.longitude > 0.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Location::parse("north", "0", "0"),
            Err(LocationError::InvalidCoordinate {
                axis: Axis::Latitude,
                ..
            })
        ));
        assert!(matches!(
            Location::parse("10N", "10N", "0"),
            Err(LocationError::InvalidCoordinate {
                axis: Axis::Longitude,
                ..
            })
        ));
        assert!(matches!(
            Location::parse("95N", "0", "0"),
            Err(LocationError::OutOfRange { .. })
        ));
        assert!(matches!(
            Location::parse("0", "0", "dusk"),
            Err(LocationError::InvalidAngle(_))
        ));
    }

    #[test]
    fn test_equator_noon_and_midnight() {
        // Near the equinox at longitude 0 the sun culminates close to 12:00 UTC.
        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
        assert!(solar_elevation_deg(0.0, 0.0, noon) > 80.0);
        assert!(solar_elevation_deg(0.0, 0.0, midnight) < -80.0);
    }

    #[test]
    fn test_classify_day_and_night() {
        let mut calc = NoaaSolarCalculator::new(Location::parse("0", "0", "-6").unwrap());
        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
        assert_eq!(calc.classify(noon), DayNight::Day);
        assert_eq!(calc.classify(midnight), DayNight::Night);
    }

    #[test]
    fn test_time_until_night_from_noon() {
        let mut calc = NoaaSolarCalculator::new(Location::parse("0", "0", "-6").unwrap());
        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let wait = calc.time_until_night(noon).unwrap();
        // Civil dusk at the equator is a bit more than six hours after noon.
        assert!(wait > Duration::from_secs(6 * 3600));
        assert!(wait < Duration::from_secs(7 * 3600));
    }

    #[test]
    fn test_time_until_night_is_zero_at_night() {
        let mut calc = NoaaSolarCalculator::new(Location::parse("0", "0", "-6").unwrap());
        let midnight = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
        assert_eq!(calc.time_until_night(midnight), Some(Duration::ZERO));
    }

    #[test]
    fn test_polar_day_has_no_night() {
        let mut calc = NoaaSolarCalculator::new(Location::parse("78N", "15E", "-6").unwrap());
        let midsummer = Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap();
        assert_eq!(calc.time_until_night(midsummer), None);
    }
}
