//! Core numerics for taxi trip-duration features.
//!
//! Everything here is pure and data-frame free: geohash and distance
//! encoders, the coordinate PCA and k-means fits, calendar features, the
//! ordered feature schema, standardization, target buckets and the result
//! cache used by the pipeline orchestrator in `trip-algo`.

pub mod bucket;
pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod kmeans;
pub mod pca;
pub mod scaler;
pub mod schema;
pub mod temporal;

pub use bucket::{duration_from_log, log_duration, Buckets, Labels};
pub use cache::{CacheKey, CacheStore, DiskStore, MemoryStore, ResultCache};
pub use config::{LabelMode, PipelineConfig};
pub use error::{TripError, TripResult};
pub use geo::{decode_bounds, geohash, haversine, manhattan, GeoPoint, GeohashBounds};
pub use kmeans::{KMeansParams, MiniBatchKMeans};
pub use pca::Pca;
pub use scaler::StandardScaler;
pub use schema::{FeatureSchema, TripSide};
pub use temporal::TemporalFeatures;
