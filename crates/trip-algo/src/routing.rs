use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use trip_core::{TripError, TripResult};
use trip_io::RouteStats;

/// Fills routing misses with training-set statistics.
///
/// The same fitted values are used for training and test rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingImputer {
    pub mean_distance: f64,
    pub mean_travel_time: f64,
    /// Rounded half to even.
    pub mean_steps: f64,
}

impl RoutingImputer {
    /// Means over the training ids that have a routing entry.
    pub fn fit<'a, I>(train_ids: I, routes: &HashMap<String, RouteStats>) -> TripResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0usize;
        let mut sums = [0.0f64; 3];
        for id in train_ids {
            if let Some(stats) = routes.get(id) {
                count += 1;
                sums[0] += stats.total_distance;
                sums[1] += stats.total_travel_time;
                sums[2] += stats.number_of_steps;
            }
        }
        if count == 0 {
            return Err(TripError::Join(
                "no training trip has routing data to impute from".into(),
            ));
        }
        let n = count as f64;
        let imputer = Self {
            mean_distance: sums[0] / n,
            mean_travel_time: sums[1] / n,
            mean_steps: (sums[2] / n).round_ties_even(),
        };
        debug!(matched = count, ?imputer, "fitted routing imputer");
        Ok(imputer)
    }

    pub fn fill(&self, stats: Option<&RouteStats>) -> RouteStats {
        match stats {
            Some(stats) => *stats,
            None => RouteStats {
                total_distance: self.mean_distance,
                total_travel_time: self.mean_travel_time,
                number_of_steps: self.mean_steps,
            },
        }
    }
}

/// Left join of `ids` onto `routes`, imputing misses. Output follows `ids`.
pub fn join_routes<'a, I>(
    ids: I,
    routes: &HashMap<String, RouteStats>,
    imputer: &RoutingImputer,
    split: &str,
) -> Vec<RouteStats>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut misses = 0usize;
    let joined: Vec<RouteStats> = ids
        .into_iter()
        .map(|id| {
            let found = routes.get(id);
            if found.is_none() {
                misses += 1;
            }
            imputer.fill(found)
        })
        .collect();
    if misses > 0 {
        warn!(split, misses, rows = joined.len(), "imputed missing routing data");
    }
    joined
}
