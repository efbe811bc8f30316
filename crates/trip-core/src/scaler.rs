use serde::{Deserialize, Serialize};

use crate::error::{TripError, TripResult};

/// Per-column standardization (zero mean, unit variance) fit on training rows.
///
/// Uses the population variance. Constant columns keep a scale of 1 so they
/// map to zero instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> TripResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| TripError::Split("cannot fit a scaler on zero rows".into()))?;
        let width = first.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(TripError::Feature(format!(
                "row {bad} has {} columns, expected {width}",
                rows[bad].len()
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = vec![0.0; width];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|acc| {
                let std = (acc / n).sqrt();
                if std > 0.0 && std.is_finite() {
                    std
                } else {
                    1.0
                }
            })
            .collect();
        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> TripResult<Vec<f64>> {
        if row.len() != self.width() {
            return Err(TripError::Feature(format!(
                "row has {} columns, scaler was fit on {}",
                row.len(),
                self.width()
            )));
        }
        Ok(row
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> TripResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> TripResult<(Self, Vec<Vec<f64>>)> {
        let scaler = Self::fit(rows)?;
        let transformed = scaler.transform(rows)?;
        Ok((scaler, transformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 10.0, 3.0],
            vec![2.0, 20.0, 3.0],
            vec![3.0, 30.0, 3.0],
            vec![6.0, 60.0, 3.0],
        ]
    }

    #[test]
    fn training_columns_are_standardized() {
        let (_, out) = StandardScaler::fit_transform(&rows()).unwrap();
        for col in 0..2 {
            let values: Vec<f64> = out.iter().map(|r| r[col]).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
        // Constant column maps to zero.
        assert!(out.iter().all(|r| r[2] == 0.0));
    }

    #[test]
    fn transform_is_affine_in_fitted_parameters() {
        let scaler = StandardScaler::fit(&rows()).unwrap();
        let probe_a = vec![vec![100.0, -5.0, 7.0]];
        let probe_b = vec![vec![100.0, -5.0, 7.0], vec![-1e6, 1e6, 0.0]];
        let a = scaler.transform(&probe_a).unwrap();
        let b = scaler.transform(&probe_b).unwrap();
        // Other rows do not influence a row's transform.
        assert_eq!(a[0], b[0]);
        for (i, v) in probe_a[0].iter().enumerate() {
            assert_eq!(a[0][i], (v - scaler.mean()[i]) / scaler.scale()[i]);
        }
    }

    #[test]
    fn rejects_ragged_or_empty_input() {
        assert!(StandardScaler::fit(&[]).is_err());
        assert!(StandardScaler::fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        let scaler = StandardScaler::fit(&rows()).unwrap();
        assert!(scaler.transform_row(&[1.0]).is_err());
    }
}
