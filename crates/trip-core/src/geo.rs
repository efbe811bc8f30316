//! Geospatial encoders: interleaved-bit geohash bytes and great-circle distances.

use serde::{Deserialize, Serialize};

use crate::error::{TripError, TripResult};

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Bits refined per geohash byte.
pub const BITS_PER_STEP: u32 = 5;

/// Largest geohash precision accepted (12 steps = 60 bisections per axis).
pub const MAX_GEOHASH_PRECISION: usize = 24;

const LNG_RANGE: (f64, f64) = (-180.0, 180.0);
const LAT_RANGE: (f64, f64) = (-90.0, 90.0);

/// A validated (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Build a point, rejecting NaN and out-of-range coordinates.
    pub fn new(lat: f64, lng: f64) -> TripResult<Self> {
        validate_coordinate(lat, lng)?;
        Ok(Self { lat, lng })
    }
}

/// Reject latitudes outside [-90, 90] and longitudes outside [-180, 180].
pub fn validate_coordinate(lat: f64, lng: f64) -> TripResult<()> {
    if !lat.is_finite() || !(LAT_RANGE.0..=LAT_RANGE.1).contains(&lat) {
        return Err(TripError::Validation(format!(
            "latitude {lat} outside [-90, 90]"
        )));
    }
    if !lng.is_finite() || !(LNG_RANGE.0..=LNG_RANGE.1).contains(&lng) {
        return Err(TripError::Validation(format!(
            "longitude {lng} outside [-180, 180]"
        )));
    }
    Ok(())
}

/// Check a geohash precision: positive, even and at most [`MAX_GEOHASH_PRECISION`].
pub fn validate_precision(precision: usize) -> TripResult<()> {
    if precision == 0 || precision % 2 != 0 || precision > MAX_GEOHASH_PRECISION {
        return Err(TripError::Validation(format!(
            "geohash precision must be an even number in 2..={MAX_GEOHASH_PRECISION}, got {precision}"
        )));
    }
    Ok(())
}

/// Encode a (longitude, latitude) pair into `precision` geohash bytes.
///
/// Each axis is refined over `precision / 2` steps. A step performs five
/// bisections of the current range and packs the choices into a byte in
/// `0..32`, first bisection in the least significant bit. The bisection
/// carries over from one step to the next, so later bytes are finer. The
/// output interleaves the axes: `[lng_0, lat_0, lng_1, lat_1, ...]`.
pub fn geohash(longitude: f64, latitude: f64, precision: usize) -> TripResult<Vec<u8>> {
    validate_precision(precision)?;
    validate_coordinate(latitude, longitude)?;

    let steps = precision / 2;
    let lng = encode_axis(longitude, LNG_RANGE, steps);
    let lat = encode_axis(latitude, LAT_RANGE, steps);
    Ok(lng
        .into_iter()
        .zip(lat)
        .flat_map(|(lng_byte, lat_byte)| [lng_byte, lat_byte])
        .collect())
}

fn encode_axis(value: f64, (mut lower, mut upper): (f64, f64), steps: usize) -> Vec<u8> {
    let mut middle = (lower + upper) / 2.0;
    let mut bytes = Vec::with_capacity(steps);
    for _ in 0..steps {
        let mut byte = 0u8;
        for bit in 0..BITS_PER_STEP {
            if value >= middle {
                lower = middle;
                byte |= 1 << bit;
            } else {
                upper = middle;
            }
            middle = (upper + lower) / 2.0;
        }
        bytes.push(byte);
    }
    bytes
}

/// Bounding box recovered from geohash bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeohashBounds {
    pub min_lng: f64,
    pub max_lng: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeohashBounds {
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        (self.min_lng..=self.max_lng).contains(&longitude)
            && (self.min_lat..=self.max_lat).contains(&latitude)
    }
}

/// Replay the bisections encoded in interleaved geohash bytes.
pub fn decode_bounds(bytes: &[u8]) -> TripResult<GeohashBounds> {
    validate_precision(bytes.len())?;
    if let Some(bad) = bytes.iter().find(|b| **b >= 1 << BITS_PER_STEP) {
        return Err(TripError::Validation(format!(
            "geohash byte {bad} does not fit in {BITS_PER_STEP} bits"
        )));
    }
    let lng_bytes: Vec<u8> = bytes.iter().step_by(2).copied().collect();
    let lat_bytes: Vec<u8> = bytes.iter().skip(1).step_by(2).copied().collect();
    let (min_lng, max_lng) = decode_axis(&lng_bytes, LNG_RANGE);
    let (min_lat, max_lat) = decode_axis(&lat_bytes, LAT_RANGE);
    Ok(GeohashBounds {
        min_lng,
        max_lng,
        min_lat,
        max_lat,
    })
}

fn decode_axis(bytes: &[u8], (mut lower, mut upper): (f64, f64)) -> (f64, f64) {
    let mut middle = (lower + upper) / 2.0;
    for byte in bytes {
        for bit in 0..BITS_PER_STEP {
            if byte & (1 << bit) != 0 {
                lower = middle;
            } else {
                upper = middle;
            }
            middle = (upper + lower) / 2.0;
        }
    }
    (lower, upper)
}

/// Great-circle distance in kilometres.
pub fn haversine(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lng1, lat2, lng2) = (
        lat1.to_radians(),
        lng1.to_radians(),
        lat2.to_radians(),
        lng2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let d = (dlat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * d.sqrt().asin()
}

/// Grid distance approximated by two great-circle legs along the axes.
pub fn manhattan(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    haversine(lat1, lng1, lat1, lng2) + haversine(lat1, lng1, lat2, lng1)
}

/// Haversine distance for each (pickup, dropoff) pair.
pub fn haversine_pairs(pickups: &[GeoPoint], dropoffs: &[GeoPoint]) -> Vec<f64> {
    pickups
        .iter()
        .zip(dropoffs)
        .map(|(a, b)| haversine(a.lat, a.lng, b.lat, b.lng))
        .collect()
}

/// Manhattan distance for each (pickup, dropoff) pair.
pub fn manhattan_pairs(pickups: &[GeoPoint], dropoffs: &[GeoPoint]) -> Vec<f64> {
    pickups
        .iter()
        .zip(dropoffs)
        .map(|(a, b)| manhattan(a.lat, a.lng, b.lat, b.lng))
        .collect()
}
