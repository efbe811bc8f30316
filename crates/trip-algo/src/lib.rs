//! Feature engineering and target bucketization for taxi trip durations.
//!
//! [`pipeline::load_data`] is the entry point: it loads trip and routing
//! tables, derives spatial and temporal features, imputes routing misses,
//! splits and standardizes the matrices, then fits target buckets. Both
//! stages are memoized through [`trip_core::ResultCache`].

pub mod featurize;
pub mod pipeline;
pub mod routing;
pub mod split;

pub use featurize::{derive_features, DerivedTrip, SpatialModel};
pub use pipeline::{
    bucketize, load_data, prepare_features, BucketizedTargets, LoadedData, Pipeline,
    PreparedFeatures,
};
pub use routing::{join_routes, RoutingImputer};
pub use split::{train_valid_split, Split};
