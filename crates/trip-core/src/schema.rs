//! Ordered feature schema.
//!
//! The column order of every feature matrix is fixed here, before any data is
//! read: base features, then pickup and dropoff geohash bytes, then routing
//! statistics. Train, validation and test matrices all follow it.

use serde::{Deserialize, Serialize};

use crate::error::TripResult;
use crate::geo::validate_precision;

pub const BASE_FEATURES: [&str; 22] = [
    "vendor_id",
    "passenger_count",
    "pickup_latitude",
    "pickup_longitude",
    "dropoff_latitude",
    "dropoff_longitude",
    "pickup_pca0",
    "pickup_pca1",
    "hour",
    "dropoff_pca0",
    "dropoff_pca1",
    "pca_manhattan",
    "month",
    "weekofyear",
    "weekday",
    "seconds",
    "week_delta",
    "week_hour",
    "week_delta_sin",
    "hour_sin",
    "manhattan",
    "haversine",
];

pub const ROUTING_FEATURES: [&str; 3] = ["total_distance", "total_travel_time", "number_of_steps"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripSide {
    Pickup,
    Dropoff,
}

impl TripSide {
    pub fn prefix(&self) -> &'static str {
        match self {
            TripSide::Pickup => "pickup",
            TripSide::Dropoff => "dropoff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    geohash_precision: usize,
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(geohash_precision: usize) -> TripResult<Self> {
        validate_precision(geohash_precision)?;
        let mut names: Vec<String> = BASE_FEATURES.iter().map(|s| s.to_string()).collect();
        for side in [TripSide::Pickup, TripSide::Dropoff] {
            names.extend(geohash_columns(side, geohash_precision));
        }
        names.extend(ROUTING_FEATURES.iter().map(|s| s.to_string()));
        Ok(Self {
            geohash_precision,
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn geohash_precision(&self) -> usize {
        self.geohash_precision
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// `<side>_geohash_0 .. <side>_geohash_{precision-1}`
pub fn geohash_columns(side: TripSide, precision: usize) -> Vec<String> {
    (0..precision)
        .map(|i| format!("{}_geohash_{i}", side.prefix()))
        .collect()
}
