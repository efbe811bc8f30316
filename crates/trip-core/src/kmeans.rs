//! Mini-batch k-means over 2-D coordinates.
//!
//! k-means++ seeding on an initialization sample, then Sculley-style
//! mini-batch updates where each center moves toward its assigned points
//! with a per-center learning rate of `1 / count`.

use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TripError, TripResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub batch_size: usize,
    pub max_iter: usize,
    pub seed: u64,
    /// Stop once no center moves farther than this between batches.
    pub tol: f64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 64,
            batch_size: 32 * 32 * 32,
            max_iter: 100,
            seed: 0,
            tol: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniBatchKMeans {
    centers: Vec<[f64; 2]>,
}

impl MiniBatchKMeans {
    /// Fit cluster centers.
    ///
    /// The effective cluster count is `min(n_clusters, distinct points in the
    /// initialization sample)`, so small inputs never produce empty clusters.
    pub fn fit(points: &[[f64; 2]], params: &KMeansParams) -> TripResult<Self> {
        if points.is_empty() {
            return Err(TripError::Feature("k-means needs at least one point".into()));
        }
        if params.n_clusters == 0 || params.batch_size == 0 {
            return Err(TripError::Validation(
                "k-means cluster count and batch size must be positive".into(),
            ));
        }
        if points.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Err(TripError::Feature(
                "k-means input contains non-finite coordinates".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let init_size = (3 * params.batch_size).max(params.n_clusters);
        let init_sample: Vec<[f64; 2]> = if points.len() <= init_size {
            points.to_vec()
        } else {
            (0..init_size)
                .map(|_| points[rng.gen_range(0..points.len())])
                .collect()
        };

        let distinct = init_sample
            .iter()
            .map(|p| (p[0].to_bits(), p[1].to_bits()))
            .collect::<HashSet<_>>()
            .len();
        let k = params.n_clusters.min(distinct);
        let mut centers = kmeans_plus_plus(&init_sample, k, &mut rng);

        let mut counts = vec![0usize; k];
        let full_batch = points.len() <= params.batch_size;
        let mut assignments = Vec::with_capacity(params.batch_size.min(points.len()));
        let mut iterations = 0;
        for _ in 0..params.max_iter {
            iterations += 1;
            let batch: Vec<[f64; 2]> = if full_batch {
                points.to_vec()
            } else {
                (0..params.batch_size)
                    .map(|_| points[rng.gen_range(0..points.len())])
                    .collect()
            };

            assignments.clear();
            assignments.extend(batch.iter().map(|p| nearest(&centers, *p)));

            let previous = centers.clone();
            for (point, &cluster) in batch.iter().zip(&assignments) {
                counts[cluster] += 1;
                let eta = 1.0 / counts[cluster] as f64;
                let c = &mut centers[cluster];
                c[0] += eta * (point[0] - c[0]);
                c[1] += eta * (point[1] - c[1]);
            }

            let shift = previous
                .iter()
                .zip(&centers)
                .map(|(a, b)| squared_distance(*a, *b))
                .fold(0.0, f64::max);
            if shift <= params.tol * params.tol {
                break;
            }
        }

        debug!(clusters = k, iterations, "fitted mini-batch k-means");
        Ok(Self { centers })
    }

    pub fn n_clusters(&self) -> usize {
        self.centers.len()
    }

    pub fn centers(&self) -> &[[f64; 2]] {
        &self.centers
    }

    /// Index of the nearest center (lowest index on ties).
    pub fn predict(&self, point: [f64; 2]) -> usize {
        nearest(&self.centers, point)
    }
}

fn kmeans_plus_plus(points: &[[f64; 2]], k: usize, rng: &mut StdRng) -> Vec<[f64; 2]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);
    let mut d2: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(*p, centers[0]))
        .collect();

    while centers.len() < k {
        let total: f64 = d2.iter().sum();
        if total <= 0.0 {
            break;
        }
        let target = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = points.len() - 1;
        for (i, w) in d2.iter().enumerate() {
            acc += w;
            if acc > target && *w > 0.0 {
                chosen = i;
                break;
            }
        }
        // Guard against landing on an existing center through rounding.
        if d2[chosen] <= 0.0 {
            if let Some(i) = d2.iter().position(|w| *w > 0.0) {
                chosen = i;
            }
        }
        let center = points[chosen];
        centers.push(center);
        for (w, p) in d2.iter_mut().zip(points) {
            *w = w.min(squared_distance(*p, center));
        }
    }
    centers
}

fn nearest(centers: &[[f64; 2]], point: [f64; 2]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = squared_distance(*c, point);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

fn squared_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}
