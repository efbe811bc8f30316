//! Quantile buckets over sorted training targets.
//!
//! Targets are sorted and cut into `bucket_count` equal-size chunks of
//! `floor(n / bucket_count)` values. Trailing values past
//! `bucket_count * bucket_size` belong to no chunk; they still get a label
//! because the last bucket is unbounded above.

use serde::{Deserialize, Serialize};

use crate::config::LabelMode;
use crate::error::{TripError, TripResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buckets {
    mins: Vec<f64>,
    maxs: Vec<f64>,
    means: Vec<f64>,
}

impl Buckets {
    /// Fit buckets from training targets only.
    pub fn fit(train_targets: &[f64], bucket_count: usize) -> TripResult<Self> {
        if bucket_count == 0 {
            return Err(TripError::Bucketize("bucket count must be positive".into()));
        }
        if let Some(bad) = train_targets.iter().find(|t| !t.is_finite()) {
            return Err(TripError::Bucketize(format!(
                "training targets must be finite, found {bad}"
            )));
        }
        let bucket_size = train_targets.len() / bucket_count;
        if bucket_size == 0 {
            return Err(TripError::Bucketize(format!(
                "{} training targets cannot fill {bucket_count} buckets",
                train_targets.len()
            )));
        }

        let mut sorted = train_targets.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mut mins = Vec::with_capacity(bucket_count);
        let mut maxs = Vec::with_capacity(bucket_count);
        let mut means = Vec::with_capacity(bucket_count);
        for chunk in sorted.chunks_exact(bucket_size).take(bucket_count) {
            mins.push(chunk[0]);
            maxs.push(chunk[chunk.len() - 1]);
            means.push(chunk.iter().sum::<f64>() / chunk.len() as f64);
        }
        Ok(Self { mins, maxs, means })
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Mean target value of each bucket, ascending.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Upper boundary of each bucket; the last one is `+inf`.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut bounds = self.maxs.clone();
        if let Some(last) = bounds.last_mut() {
            *last = f64::INFINITY;
        }
        bounds
    }

    /// Index of the first bucket whose boundary is `>= value`.
    pub fn hard_label(&self, value: f64) -> TripResult<usize> {
        if value.is_nan() {
            return Err(TripError::Bucketize("cannot label a NaN target".into()));
        }
        let last = self.len() - 1;
        Ok(self.maxs[..last].partition_point(|max| *max < value))
    }

    pub fn hard_labels(&self, values: &[f64]) -> TripResult<Vec<usize>> {
        values.iter().map(|v| self.hard_label(*v)).collect()
    }

    /// Gaussian class distribution centered at `value`.
    ///
    /// The spread is half the width of the home bucket. The home bucket
    /// absorbs whatever is needed to make the vector sum to exactly 1; a
    /// zero-width home bucket puts all the mass there.
    pub fn soft_label(&self, value: f64) -> TripResult<Vec<f64>> {
        let home = self.hard_label(value)?;
        let sigma = (self.maxs[home] - self.mins[home]) / 2.0;

        let mut probs: Vec<f64> = if sigma > 0.0 {
            self.means
                .iter()
                .map(|mean| (-((mean - value).powi(2) / (2.0 * sigma * sigma))).exp())
                .collect()
        } else {
            vec![0.0; self.len()]
        };

        let total: f64 = probs.iter().sum();
        if total > 0.0 && total.is_finite() {
            for p in probs.iter_mut() {
                *p /= total;
            }
        }
        let others: f64 = probs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != home)
            .map(|(_, p)| *p)
            .sum();
        probs[home] = (1.0 - others).max(0.0);
        Ok(probs)
    }

    pub fn soft_labels(&self, values: &[f64]) -> TripResult<Vec<Vec<f64>>> {
        values.iter().map(|v| self.soft_label(*v)).collect()
    }

    /// Continuous prediction for a predicted bucket index.
    pub fn debucketize(&self, index: usize) -> Option<f64> {
        self.means.get(index).copied()
    }

    /// Probability-weighted bucket mean for a predicted class distribution.
    pub fn expected_value(&self, probs: &[f64]) -> TripResult<f64> {
        if probs.len() != self.len() {
            return Err(TripError::Bucketize(format!(
                "expected {} class probabilities, got {}",
                self.len(),
                probs.len()
            )));
        }
        let total: f64 = probs.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(TripError::Bucketize(
                "class probabilities must have a positive finite sum".into(),
            ));
        }
        Ok(probs
            .iter()
            .zip(&self.means)
            .map(|(p, m)| p * m)
            .sum::<f64>()
            / total)
    }

    pub fn labels(&self, values: &[f64], mode: LabelMode) -> TripResult<Labels> {
        Ok(match mode {
            LabelMode::Hard => Labels::Hard(self.hard_labels(values)?),
            LabelMode::Soft => Labels::Soft(self.soft_labels(values)?),
        })
    }
}

/// Classifier labels for a set of targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "labels", rename_all = "lowercase")]
pub enum Labels {
    Hard(Vec<usize>),
    Soft(Vec<Vec<f64>>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Hard(labels) => labels.len(),
            Labels::Soft(labels) => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> LabelMode {
        match self {
            Labels::Hard(_) => LabelMode::Hard,
            Labels::Soft(_) => LabelMode::Soft,
        }
    }
}

/// `ln(duration + 1)`, the regression target.
pub fn log_duration(seconds: f64) -> f64 {
    (seconds + 1.0).ln()
}

/// Inverse of [`log_duration`].
pub fn duration_from_log(log_value: f64) -> f64 {
    log_value.exp() - 1.0
}
