//! Per-trip feature derivation.
//!
//! Spatial models (PCA rotation and k-means clusters) are fitted once over
//! the outlier-filtered pickup and dropoff coordinates of every trip, then
//! each trip is mapped independently to a [`DerivedTrip`].

use anyhow::{Context, Result};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use trip_core::geo::{haversine, manhattan};
use trip_core::pca::{filter_outliers, pca_manhattan};
use trip_core::schema::BASE_FEATURES;
use trip_core::temporal::round_to_hour;
use trip_core::{
    geohash, log_duration, MiniBatchKMeans, Pca, PipelineConfig, TemporalFeatures, TripError,
    TripResult,
};
use trip_io::TripRecord;

/// Spatial models shared by every trip of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialModel {
    pub pca: Pca,
    pub clusters: MiniBatchKMeans,
}

impl SpatialModel {
    /// Fit on pickup and dropoff `[lat, lng]` pairs of all trips, train and test.
    pub fn fit(trips: &[TripRecord], config: &PipelineConfig) -> TripResult<Self> {
        let coords: Vec<[f64; 2]> = trips
            .iter()
            .flat_map(|t| [[t.pickup.lat, t.pickup.lng], [t.dropoff.lat, t.dropoff.lng]])
            .collect();
        let fit_coords = filter_outliers(&coords, config.pca_outlier_std);
        let pca = Pca::fit(&fit_coords)?;
        let clusters = MiniBatchKMeans::fit(&fit_coords, &config.kmeans_params())?;
        debug!(
            fit_points = fit_coords.len(),
            clusters = clusters.n_clusters(),
            "fitted spatial models"
        );
        Ok(Self { pca, clusters })
    }
}

/// Everything derived for one trip, before routing statistics are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedTrip {
    pub id: String,
    /// `ln(trip_duration + 1)`; `None` for test trips.
    pub target: Option<f64>,
    /// Values in [`BASE_FEATURES`] order.
    pub base: Vec<f64>,
    /// Pickup bytes followed by dropoff bytes.
    pub geohash: Vec<u8>,
    pub pickup_cluster: usize,
    pub dropoff_cluster: usize,
    /// Pickup time rounded to the nearest hour, as epoch seconds. Not part of
    /// the feature matrix.
    pub pickup_hour_group: i64,
}

impl DerivedTrip {
    pub fn is_training(&self) -> bool {
        self.target.is_some()
    }
}

pub fn derive_trip(
    trip: &TripRecord,
    model: &SpatialModel,
    geohash_precision: usize,
) -> TripResult<DerivedTrip> {
    let (pickup, dropoff) = (trip.pickup, trip.dropoff);
    let pickup_pca = model.pca.transform([pickup.lat, pickup.lng]);
    let dropoff_pca = model.pca.transform([dropoff.lat, dropoff.lng]);
    let time = TemporalFeatures::from_timestamp(&trip.pickup_datetime);

    let base = vec![
        trip.vendor_id,
        trip.passenger_count,
        pickup.lat,
        pickup.lng,
        dropoff.lat,
        dropoff.lng,
        pickup_pca[0],
        pickup_pca[1],
        time.hour as f64,
        dropoff_pca[0],
        dropoff_pca[1],
        pca_manhattan(pickup_pca, dropoff_pca),
        time.month as f64,
        time.weekofyear as f64,
        time.weekday as f64,
        time.seconds,
        time.week_delta,
        time.week_hour,
        time.week_delta_sin,
        time.hour_sin,
        manhattan(pickup.lat, pickup.lng, dropoff.lat, dropoff.lng),
        haversine(pickup.lat, pickup.lng, dropoff.lat, dropoff.lng),
    ];
    debug_assert_eq!(base.len(), BASE_FEATURES.len());
    if let Some(pos) = base.iter().position(|v| !v.is_finite()) {
        return Err(TripError::Feature(format!(
            "trip {}: {} is not finite",
            trip.id, BASE_FEATURES[pos]
        )));
    }

    let mut hash = geohash(pickup.lng, pickup.lat, geohash_precision)
        .map_err(|err| TripError::Feature(format!("trip {} pickup: {err}", trip.id)))?;
    hash.extend(
        geohash(dropoff.lng, dropoff.lat, geohash_precision)
            .map_err(|err| TripError::Feature(format!("trip {} dropoff: {err}", trip.id)))?,
    );

    Ok(DerivedTrip {
        id: trip.id.clone(),
        target: trip.trip_duration.map(log_duration),
        base,
        geohash: hash,
        pickup_cluster: model.clusters.predict([pickup.lat, pickup.lng]),
        dropoff_cluster: model.clusters.predict([dropoff.lat, dropoff.lng]),
        pickup_hour_group: round_to_hour(&trip.pickup_datetime).and_utc().timestamp(),
    })
}

/// Fit the spatial models and derive features for every trip, keeping input order.
pub fn derive_features(trips: &[TripRecord], config: &PipelineConfig) -> Result<Vec<DerivedTrip>> {
    if trips.is_empty() {
        return Err(TripError::Feature("no trips to featurize".into()).into());
    }
    let model = SpatialModel::fit(trips, config).context("fitting spatial models")?;
    let precision = config.geohash_precision;

    #[cfg(feature = "parallel")]
    let derived = trips
        .par_iter()
        .map(|trip| derive_trip(trip, &model, precision))
        .collect::<TripResult<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let derived = trips
        .iter()
        .map(|trip| derive_trip(trip, &model, precision))
        .collect::<TripResult<Vec<_>>>()?;

    info!(
        trips = derived.len(),
        clusters = model.clusters.n_clusters(),
        "derived trip features"
    );
    Ok(derived)
}
