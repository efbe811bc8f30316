//! Pipeline configuration knobs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TripError, TripResult};
use crate::geo::validate_precision;
use crate::kmeans::KMeansParams;

/// How training/validation targets are turned into classifier labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// Bucket index per target.
    #[default]
    Hard,
    /// Gaussian probability vector over buckets per target.
    Soft,
}

impl fmt::Display for LabelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelMode::Hard => write!(f, "hard"),
            LabelMode::Soft => write!(f, "soft"),
        }
    }
}

impl FromStr for LabelMode {
    type Err = TripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hard" => Ok(LabelMode::Hard),
            "soft" => Ok(LabelMode::Soft),
            other => Err(TripError::Config(format!(
                "unknown label mode '{other}'; use hard or soft"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fraction of training rows held out for validation
    #[serde(default = "default_valid_size")]
    pub valid_size: f64,
    /// Number of target buckets
    #[serde(default = "default_output_size")]
    pub output_size: usize,
    /// Copy the data directory to `scratch_dir` before writing the cache
    #[serde(default)]
    pub cache_read_only: bool,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_geohash_precision")]
    pub geohash_precision: usize,
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,
    /// Half-width, in standard deviations, of the coordinate window used to fit PCA and k-means
    #[serde(default = "default_pca_outlier_std")]
    pub pca_outlier_std: f64,
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
    #[serde(default = "default_kmeans_batch_size")]
    pub kmeans_batch_size: usize,
    #[serde(default = "default_kmeans_max_iter")]
    pub kmeans_max_iter: usize,
    #[serde(default)]
    pub kmeans_seed: u64,
    #[serde(default)]
    pub labels: LabelMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            valid_size: default_valid_size(),
            output_size: default_output_size(),
            cache_read_only: false,
            scratch_dir: default_scratch_dir(),
            geohash_precision: default_geohash_precision(),
            cluster_count: default_cluster_count(),
            pca_outlier_std: default_pca_outlier_std(),
            split_seed: default_split_seed(),
            kmeans_batch_size: default_kmeans_batch_size(),
            kmeans_max_iter: default_kmeans_max_iter(),
            kmeans_seed: 0,
            labels: LabelMode::default(),
        }
    }
}

fn default_valid_size() -> f64 {
    0.2
}

fn default_output_size() -> usize {
    100
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/output/cache")
}

fn default_geohash_precision() -> usize {
    12
}

fn default_cluster_count() -> usize {
    64
}

fn default_pca_outlier_std() -> f64 {
    1.0
}

fn default_split_seed() -> u64 {
    459
}

fn default_kmeans_batch_size() -> usize {
    32 * 32 * 32
}

fn default_kmeans_max_iter() -> usize {
    100
}

impl PipelineConfig {
    pub fn validate(&self) -> TripResult<()> {
        if !(self.valid_size > 0.0 && self.valid_size < 1.0) {
            return Err(TripError::Config(format!(
                "valid_size must be in (0, 1), got {}",
                self.valid_size
            )));
        }
        if self.output_size == 0 {
            return Err(TripError::Config("output_size must be positive".into()));
        }
        validate_precision(self.geohash_precision)
            .map_err(|err| TripError::Config(err.to_string()))?;
        if self.cluster_count == 0 {
            return Err(TripError::Config("cluster_count must be positive".into()));
        }
        if !(self.pca_outlier_std > 0.0 && self.pca_outlier_std.is_finite()) {
            return Err(TripError::Config(format!(
                "pca_outlier_std must be positive, got {}",
                self.pca_outlier_std
            )));
        }
        if self.kmeans_batch_size == 0 || self.kmeans_max_iter == 0 {
            return Err(TripError::Config(
                "kmeans_batch_size and kmeans_max_iter must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn kmeans_params(&self) -> KMeansParams {
        KMeansParams {
            n_clusters: self.cluster_count,
            batch_size: self.kmeans_batch_size,
            max_iter: self.kmeans_max_iter,
            seed: self.kmeans_seed,
            ..KMeansParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.geohash_precision, 12);
        assert_eq!(config.cluster_count, 64);
        assert_eq!(config.kmeans_params().batch_size, 32768);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"valid_size": 0.25, "labels": "soft"}"#).unwrap();
        assert_eq!(config.valid_size, 0.25);
        assert_eq!(config.labels, LabelMode::Soft);
        assert_eq!(config.split_seed, 459);
    }

    #[test]
    fn rejects_bad_knobs() {
        let mut config = PipelineConfig::default();
        config.valid_size = 1.0;
        assert!(matches!(config.validate(), Err(TripError::Config(_))));

        let mut config = PipelineConfig::default();
        config.geohash_precision = 3;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.pca_outlier_std = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn label_mode_parses() {
        assert_eq!("Soft".parse::<LabelMode>().unwrap(), LabelMode::Soft);
        assert!("fuzzy".parse::<LabelMode>().is_err());
        assert_eq!(LabelMode::Hard.to_string(), "hard");
    }
}
