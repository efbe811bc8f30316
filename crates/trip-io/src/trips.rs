use anyhow::Result;
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use trip_core::temporal::parse_timestamp;
use trip_core::{GeoPoint, TripError};

use crate::frame::{column_f64, column_utf8, optional_f64, optional_utf8, read_csv};

/// One observed (training) or to-be-predicted (test) taxi trip.
///
/// `trip_duration` is `None` for test rows; that is the only thing that
/// separates the two once the tables are combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: String,
    pub vendor_id: f64,
    pub passenger_count: f64,
    pub pickup_datetime: NaiveDateTime,
    pub dropoff_datetime: Option<NaiveDateTime>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    /// Seconds.
    pub trip_duration: Option<f64>,
}

impl TripRecord {
    pub fn is_training(&self) -> bool {
        self.trip_duration.is_some()
    }
}

/// Read a trip table (train or test layout).
pub fn read_trip_table(path: &Path) -> Result<Vec<TripRecord>> {
    let df = read_csv(path)?;
    let table = path.display().to_string();
    let trips = parse_trips(&df, &table)?;
    info!(
        rows = trips.len(),
        training = trips.iter().filter(|t| t.is_training()).count(),
        "loaded trip table {table}"
    );
    Ok(trips)
}

/// Read the train and test tables under `datadir`, train rows first.
pub fn load_trips(datadir: &Path, trainset: &str, testset: &str) -> Result<Vec<TripRecord>> {
    let mut trips = read_trip_table(&datadir.join(trainset))?;
    trips.extend(read_trip_table(&datadir.join(testset))?);
    Ok(trips)
}

pub fn parse_trips(df: &DataFrame, table: &str) -> Result<Vec<TripRecord>> {
    let ids = column_utf8(df, "id", table)?;
    let vendor = column_f64(df, "vendor_id", table)?;
    let passengers = column_f64(df, "passenger_count", table)?;
    let pickup_dt = column_utf8(df, "pickup_datetime", table)?;
    let dropoff_dt = optional_utf8(df, "dropoff_datetime", table)?;
    let pickup_lat = column_f64(df, "pickup_latitude", table)?;
    let pickup_lng = column_f64(df, "pickup_longitude", table)?;
    let dropoff_lat = column_f64(df, "dropoff_latitude", table)?;
    let dropoff_lng = column_f64(df, "dropoff_longitude", table)?;
    let duration = optional_f64(df, "trip_duration", table)?;

    let mut trips = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let id = ids[idx]
            .clone()
            .ok_or_else(|| TripError::Validation(format!("{table}: row {idx} has no id")))?;
        let field = |values: &[Option<f64>], column: &str| -> Result<f64> {
            values[idx].ok_or_else(|| {
                TripError::Validation(format!("{table}: trip {id} is missing {column}")).into()
            })
        };
        let point = |lat: f64, lng: f64, side: &str| -> Result<GeoPoint> {
            GeoPoint::new(lat, lng).map_err(|err| {
                TripError::Validation(format!("{table}: trip {id} {side}: {err}")).into()
            })
        };

        let pickup_raw = pickup_dt[idx].as_deref().ok_or_else(|| {
            TripError::Validation(format!("{table}: trip {id} is missing pickup_datetime"))
        })?;
        let pickup_datetime = parse_timestamp(pickup_raw)
            .map_err(|err| TripError::Validation(format!("{table}: trip {id}: {err}")))?;
        let dropoff_datetime = match dropoff_dt[idx].as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(
                parse_timestamp(raw)
                    .map_err(|err| TripError::Validation(format!("{table}: trip {id}: {err}")))?,
            ),
            _ => None,
        };

        trips.push(TripRecord {
            vendor_id: field(&vendor, "vendor_id")?,
            passenger_count: field(&passengers, "passenger_count")?,
            pickup_datetime,
            dropoff_datetime,
            pickup: point(
                field(&pickup_lat, "pickup_latitude")?,
                field(&pickup_lng, "pickup_longitude")?,
                "pickup",
            )?,
            dropoff: point(
                field(&dropoff_lat, "dropoff_latitude")?,
                field(&dropoff_lng, "dropoff_longitude")?,
                "dropoff",
            )?,
            trip_duration: duration[idx],
            id,
        });
    }
    Ok(trips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const TRAIN: &str = "\
id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag,trip_duration
id0001,2,2016-03-14 17:24:55,2016-03-14 17:32:30,1,-73.982155,40.767937,-73.964630,40.765602,N,455
id0002,1,2016-06-12 00:43:35,2016-06-12 00:54:38,1,-73.980415,40.738564,-73.999481,40.731152,N,663
";

    const TEST: &str = "\
id,vendor_id,pickup_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag
id9001,1,2016-06-30 23:59:58,1,-73.988129,40.732029,-73.990173,40.756680,N
";

    #[test]
    fn reads_train_and_test_layouts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("train.csv"), TRAIN).unwrap();
        fs::write(dir.path().join("test.csv"), TEST).unwrap();
        let trips = load_trips(dir.path(), "train.csv", "test.csv").unwrap();
        assert_eq!(trips.len(), 3);
        assert_eq!(trips[0].id, "id0001");
        assert_eq!(trips[0].trip_duration, Some(455.0));
        assert_eq!(trips[0].pickup.lng, -73.982155);
        assert!(trips[0].dropoff_datetime.is_some());
        assert_eq!(trips[2].trip_duration, None);
        assert_eq!(trips[2].dropoff_datetime, None);
        assert!(!trips[2].is_training());
    }

    #[test]
    fn reports_offending_trip() {
        let dir = tempdir().unwrap();
        let bad = TRAIN.replace("40.738564", "95.0");
        fs::write(dir.path().join("train.csv"), bad).unwrap();
        let err = read_trip_table(&dir.path().join("train.csv")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("id0002"), "{msg}");
        assert!(msg.contains("latitude"), "{msg}");
    }

    #[test]
    fn reports_unparseable_timestamp() {
        let dir = tempdir().unwrap();
        let bad = TRAIN.replace("2016-03-14 17:24:55", "yesterday");
        fs::write(dir.path().join("train.csv"), bad).unwrap();
        let err = read_trip_table(&dir.path().join("train.csv")).unwrap_err();
        assert!(err.to_string().contains("id0001"));
        assert!(matches!(
            err.downcast_ref::<TripError>(),
            Some(TripError::Validation(_))
        ));
    }

    #[test]
    fn missing_column_is_a_load_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), "id,vendor_id\na,1\n").unwrap();
        let err = read_trip_table(&dir.path().join("t.csv")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TripError>(),
            Some(TripError::Load(_))
        ));
    }
}
