use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use trip_core::TripError;

use crate::frame::{column_f64, column_utf8, read_csv};

pub const TRAIN_ROUTE_FILES: [&str; 2] = [
    "osrm/fastest_routes_train_part_1.csv",
    "osrm/fastest_routes_train_part_2.csv",
];
pub const TEST_ROUTE_FILE: &str = "osrm/fastest_routes_test.csv";

/// Precomputed shortest-route statistics for one trip id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteStats {
    pub total_distance: f64,
    pub total_travel_time: f64,
    pub number_of_steps: f64,
}

impl RouteStats {
    /// Values in feature-schema order.
    pub fn values(&self) -> [f64; 3] {
        [
            self.total_distance,
            self.total_travel_time,
            self.number_of_steps,
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTables {
    pub train: HashMap<String, RouteStats>,
    pub test: HashMap<String, RouteStats>,
}

/// Read one routing table keyed by trip id. Duplicate ids keep their first row.
pub fn read_route_table(path: &Path) -> Result<HashMap<String, RouteStats>> {
    let df = read_csv(path)?;
    let table = path.display().to_string();
    let ids = column_utf8(&df, "id", &table)?;
    let distance = column_f64(&df, "total_distance", &table)?;
    let travel_time = column_f64(&df, "total_travel_time", &table)?;
    let steps = column_f64(&df, "number_of_steps", &table)?;

    let mut routes = HashMap::with_capacity(df.height());
    let mut duplicates = 0usize;
    for idx in 0..df.height() {
        let Some(id) = ids[idx].clone() else {
            return Err(TripError::Load(format!("{table}: row {idx} has no id")).into());
        };
        let (Some(total_distance), Some(total_travel_time), Some(number_of_steps)) =
            (distance[idx], travel_time[idx], steps[idx])
        else {
            return Err(
                TripError::Load(format!("{table}: route for trip {id} has empty fields")).into(),
            );
        };
        if routes.contains_key(&id) {
            duplicates += 1;
            continue;
        }
        routes.insert(
            id,
            RouteStats {
                total_distance,
                total_travel_time,
                number_of_steps,
            },
        );
    }
    if duplicates > 0 {
        warn!(duplicates, "{table}: duplicate route ids ignored");
    }
    Ok(routes)
}

/// Load the two training parts (concatenated) and the test routes.
pub fn load_routing(datadir: &Path) -> Result<RoutingTables> {
    let mut train = HashMap::new();
    for file in TRAIN_ROUTE_FILES {
        for (id, stats) in read_route_table(&datadir.join(file))? {
            train.entry(id).or_insert(stats);
        }
    }
    let test = read_route_table(&datadir.join(TEST_ROUTE_FILE))?;
    info!(
        train = train.len(),
        test = test.len(),
        "loaded routing tables"
    );
    Ok(RoutingTables { train, test })
}
