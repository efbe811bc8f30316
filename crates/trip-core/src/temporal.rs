//! Calendar and time-of-day features derived from the pickup timestamp.

use std::f64::consts::PI;

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{TripError, TripResult};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a trip timestamp (`YYYY-MM-DD HH:MM:SS`, optional `T` separator and fraction).
pub fn parse_timestamp(raw: &str) -> TripResult<NaiveDateTime> {
    let trimmed = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| TripError::Validation(format!("unparseable timestamp '{raw}'")))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub month: u32,
    /// ISO 8601 week number.
    pub weekofyear: u32,
    /// Monday = 0 ... Sunday = 6.
    pub weekday: u32,
    pub hour: u32,
    /// `weekday + (hour + minute / 60) / 24`
    pub week_delta: f64,
    /// `weekday * 24 + hour`
    pub week_hour: f64,
    /// `second + minute * 60`
    pub seconds: f64,
    pub week_delta_sin: f64,
    pub hour_sin: f64,
}

impl TemporalFeatures {
    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        let weekday = ts.weekday().num_days_from_monday();
        let hour = ts.hour();
        let minute = ts.minute() as f64;
        let week_delta = weekday as f64 + (hour as f64 + minute / 60.0) / 24.0;
        Self {
            month: ts.month(),
            weekofyear: ts.iso_week().week(),
            weekday,
            hour,
            week_delta,
            week_hour: weekday as f64 * 24.0 + hour as f64,
            seconds: ts.second() as f64 + minute * 60.0,
            week_delta_sin: cyclic(week_delta, 7.0),
            hour_sin: cyclic(hour as f64, 24.0),
        }
    }
}

/// `sin²(π · value / period)`: bounded in [0, 1] and equal at both ends of the period.
pub fn cyclic(value: f64, period: f64) -> f64 {
    ((value / period) * PI).sin().powi(2)
}

/// Round to the nearest hour; exact half hours go to the even hour.
pub fn round_to_hour(ts: &NaiveDateTime) -> NaiveDateTime {
    let secs = ts.and_utc().timestamp();
    let rem = secs.rem_euclid(3600);
    let floor = secs - rem;
    let up = rem > 1800 || (rem == 1800 && (floor / 3600) % 2 != 0);
    let base = *ts - Duration::seconds(rem) - Duration::nanoseconds(ts.nanosecond() as i64);
    if up {
        base + Duration::hours(1)
    } else {
        base
    }
}
