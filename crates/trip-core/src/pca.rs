//! Principal-component rotation of (latitude, longitude) coordinates.
//!
//! Used to align the dominant street-grid orientation with the feature axes.
//! The fit runs on outlier-filtered pickup + dropoff coordinates; every trip
//! is transformed afterwards.

use faer::{FaerMat, Mat, Side};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TripError, TripResult};

/// Keep points strictly inside `mean ± k·std` on both axes.
///
/// Uses the population standard deviation. When fewer than two points survive
/// (tiny or degenerate inputs), the full set is returned so downstream fits
/// still have data.
pub fn filter_outliers(points: &[[f64; 2]], k_std: f64) -> Vec<[f64; 2]> {
    if points.is_empty() {
        return Vec::new();
    }
    let (mean, std) = column_mean_std(points);
    let lower = [mean[0] - k_std * std[0], mean[1] - k_std * std[1]];
    let upper = [mean[0] + k_std * std[0], mean[1] + k_std * std[1]];

    let kept: Vec<[f64; 2]> = points
        .iter()
        .filter(|p| p[0] > lower[0] && p[0] < upper[0] && p[1] > lower[1] && p[1] < upper[1])
        .copied()
        .collect();

    if kept.len() < 2 {
        warn!(
            total = points.len(),
            kept = kept.len(),
            "outlier filter left too few coordinates; fitting on all of them"
        );
        return points.to_vec();
    }
    debug!(total = points.len(), kept = kept.len(), "filtered coordinate outliers");
    kept
}

fn column_mean_std(points: &[[f64; 2]]) -> ([f64; 2], [f64; 2]) {
    let n = points.len() as f64;
    let mut mean = [0.0; 2];
    for p in points {
        mean[0] += p[0];
        mean[1] += p[1];
    }
    mean[0] /= n;
    mean[1] /= n;

    let mut var = [0.0; 2];
    for p in points {
        var[0] += (p[0] - mean[0]).powi(2);
        var[1] += (p[1] - mean[1]).powi(2);
    }
    ([mean[0], mean[1]], [(var[0] / n).sqrt(), (var[1] / n).sqrt()])
}

/// Fitted two-dimensional PCA rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    pub mean: [f64; 2],
    /// Rows are principal axes, ordered by decreasing explained variance.
    pub components: [[f64; 2]; 2],
    pub explained_variance: [f64; 2],
}

impl Pca {
    /// Fit on a set of points (needs at least two).
    pub fn fit(points: &[[f64; 2]]) -> TripResult<Self> {
        if points.len() < 2 {
            return Err(TripError::Feature(format!(
                "PCA needs at least 2 coordinates, got {}",
                points.len()
            )));
        }
        if points.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Err(TripError::Feature(
                "PCA input contains non-finite coordinates".into(),
            ));
        }

        let (mean, _) = column_mean_std(points);
        let denom = (points.len() - 1) as f64;
        let mut cov = [[0.0f64; 2]; 2];
        for p in points {
            let d = [p[0] - mean[0], p[1] - mean[1]];
            for i in 0..2 {
                for j in 0..2 {
                    cov[i][j] += d[i] * d[j] / denom;
                }
            }
        }

        let mat = Mat::from_fn(2, 2, |i, j| cov[i][j]);
        let evd = mat.selfadjoint_eigendecomposition(Side::Lower);
        let u = evd.u();

        let mut axes: Vec<([f64; 2], f64)> = (0..2)
            .map(|j| {
                let v = [u.read(0, j), u.read(1, j)];
                (orient(v), rayleigh(&cov, v))
            })
            .collect();
        axes.sort_by(|a, b| b.1.total_cmp(&a.1));

        let pca = Pca {
            mean,
            components: [axes[0].0, axes[1].0],
            explained_variance: [axes[0].1.max(0.0), axes[1].1.max(0.0)],
        };
        debug!(?pca, "fitted coordinate PCA");
        Ok(pca)
    }

    /// Project a point onto the principal axes.
    pub fn transform(&self, point: [f64; 2]) -> [f64; 2] {
        let d = [point[0] - self.mean[0], point[1] - self.mean[1]];
        [
            self.components[0][0] * d[0] + self.components[0][1] * d[1],
            self.components[1][0] * d[0] + self.components[1][1] * d[1],
        ]
    }
}

// Largest-magnitude loading is made positive so fits are reproducible.
fn orient(v: [f64; 2]) -> [f64; 2] {
    let pivot = if v[0].abs() >= v[1].abs() { v[0] } else { v[1] };
    if pivot < 0.0 {
        [-v[0], -v[1]]
    } else {
        v
    }
}

fn rayleigh(cov: &[[f64; 2]; 2], v: [f64; 2]) -> f64 {
    let cv = [
        cov[0][0] * v[0] + cov[0][1] * v[1],
        cov[1][0] * v[0] + cov[1][1] * v[1],
    ];
    v[0] * cv[0] + v[1] * cv[1]
}

/// L1 distance between two points in PCA space.
pub fn pca_manhattan(a: [f64; 2], b: [f64; 2]) -> f64 {
    (b[0] - a[0]).abs() + (b[1] - a[1]).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal_cloud() -> Vec<[f64; 2]> {
        // Spread along y = x with a little orthogonal noise.
        (0..25)
            .flat_map(|i| {
                let t = i as f64 / 10.0;
                [[t + 0.05, t - 0.05], [t - 0.05, t + 0.05]]
            })
            .collect()
    }

    #[test]
    fn first_component_follows_main_direction() {
        let pca = Pca::fit(&diagonal_cloud()).unwrap();
        let c0 = pca.components[0];
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert!((c0[0] - s).abs() < 1e-6, "{c0:?}");
        assert!((c0[1] - s).abs() < 1e-6, "{c0:?}");
        assert!(pca.explained_variance[0] > pca.explained_variance[1]);
    }

    #[test]
    fn components_are_orthonormal() {
        let pca = Pca::fit(&diagonal_cloud()).unwrap();
        let [a, b] = pca.components;
        assert!((a[0] * a[0] + a[1] * a[1] - 1.0).abs() < 1e-9);
        assert!((b[0] * b[0] + b[1] * b[1] - 1.0).abs() < 1e-9);
        assert!((a[0] * b[0] + a[1] * b[1]).abs() < 1e-9);
    }

    #[test]
    fn transform_centers_the_mean() {
        let pca = Pca::fit(&diagonal_cloud()).unwrap();
        let projected = pca.transform(pca.mean);
        assert!(projected[0].abs() < 1e-12 && projected[1].abs() < 1e-12);
    }

    #[test]
    fn fit_rejects_too_few_points() {
        assert!(Pca::fit(&[[1.0, 2.0]]).is_err());
        assert!(Pca::fit(&[[f64::NAN, 2.0], [1.0, 1.0]]).is_err());
    }

    #[test]
    fn filter_drops_far_points() {
        let mut points: Vec<[f64; 2]> = (0..20)
            .map(|i| [40.7 + (i % 5) as f64 * 0.01, -73.9 + (i % 4) as f64 * 0.01])
            .collect();
        points.push([10.0, 10.0]);
        let kept = filter_outliers(&points, 1.0);
        assert!(kept.len() < points.len());
        assert!(!kept.contains(&[10.0, 10.0]));
    }

    #[test]
    fn filter_falls_back_on_degenerate_input() {
        let points = vec![[1.0, 1.0]; 5];
        assert_eq!(filter_outliers(&points, 1.0).len(), 5);
    }

    #[test]
    fn pca_manhattan_is_l1() {
        assert_eq!(pca_manhattan([0.0, 0.0], [1.0, -2.0]), 3.0);
    }
}
