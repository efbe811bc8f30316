pub mod completions;
pub mod distance;
pub mod geohash;
pub mod prepare;
pub mod telemetry;
