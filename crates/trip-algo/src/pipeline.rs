//! The memoized feature and bucketization pipeline.
//!
//! [`Pipeline::load`] runs two cached stages: [`prepare_features`] (keyed on
//! every argument except the data directory, so relocated data still hits)
//! and [`bucketize`] (keyed on the exact target bits, bucket count and label
//! mode). [`load_data`] is the production entry point that also handles the
//! read-only scratch copy and the on-disk cache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use trip_core::{
    Buckets, CacheKey, CacheStore, DiskStore, FeatureSchema, LabelMode, Labels, PipelineConfig,
    ResultCache, StandardScaler, TripError, TripResult,
};
use trip_io::{copy_data_dir, load_routing, load_trips};

use crate::featurize::{derive_features, DerivedTrip};
use crate::routing::{join_routes, RoutingImputer};
use crate::split::{take, train_valid_split};

/// Standardized matrices and raw log-duration targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedFeatures {
    pub feature_names: Vec<String>,
    pub test_ids: Vec<String>,
    pub test: Vec<Vec<f64>>,
    pub train: Vec<Vec<f64>>,
    pub valid: Vec<Vec<f64>>,
    pub train_targets: Vec<f64>,
    pub valid_targets: Vec<f64>,
    pub scaler: StandardScaler,
    pub imputer: RoutingImputer,
}

impl PreparedFeatures {
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketizedTargets {
    pub buckets: Buckets,
    pub train_labels: Labels,
    pub valid_labels: Labels,
}

/// Everything the downstream classifier needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedData {
    pub features: PreparedFeatures,
    pub labels: BucketizedTargets,
}

impl LoadedData {
    pub fn feature_count(&self) -> usize {
        self.features.feature_count()
    }

    pub fn bucket_means(&self) -> &[f64] {
        self.labels.buckets.means()
    }
}

/// Feature stage: load, derive, join routing data, split and standardize.
pub fn prepare_features(
    datadir: &Path,
    trainset: &str,
    testset: &str,
    config: &PipelineConfig,
) -> Result<PreparedFeatures> {
    config.validate()?;
    let schema = FeatureSchema::new(config.geohash_precision)?;

    let trips = load_trips(datadir, trainset, testset).context("loading trip tables")?;
    let derived = derive_features(&trips, config).context("deriving features")?;
    let (train_rows, test_rows): (Vec<&DerivedTrip>, Vec<&DerivedTrip>) =
        derived.iter().partition(|d| d.is_training());
    if train_rows.is_empty() {
        let reason = format!("{trainset} has no rows with a trip_duration");
        return Err(TripError::Split(reason).into());
    }
    info!(
        train = train_rows.len(),
        test = test_rows.len(),
        "separated training and test trips"
    );

    let routing = load_routing(datadir).context("loading routing tables")?;
    let imputer = RoutingImputer::fit(train_rows.iter().map(|d| d.id.as_str()), &routing.train)
        .context("joining routing data")?;
    let train_routes = join_routes(
        train_rows.iter().map(|d| d.id.as_str()),
        &routing.train,
        &imputer,
        "train",
    );
    let test_routes = join_routes(
        test_rows.iter().map(|d| d.id.as_str()),
        &routing.test,
        &imputer,
        "test",
    );

    let assemble = |rows: &[&DerivedTrip], routes: &[trip_io::RouteStats]| -> Vec<Vec<f64>> {
        rows.iter()
            .zip(routes)
            .map(|(d, r)| {
                let mut row = Vec::with_capacity(schema.len());
                row.extend_from_slice(&d.base);
                row.extend(d.geohash.iter().map(|b| *b as f64));
                row.extend(r.values());
                row
            })
            .collect()
    };
    let train_matrix = assemble(&train_rows, &train_routes);
    let test_matrix = assemble(&test_rows, &test_routes);
    if let Some(row) = train_matrix.first() {
        if row.len() != schema.len() {
            return Err(TripError::Feature(format!(
                "assembled {} columns, schema has {}",
                row.len(),
                schema.len()
            ))
            .into());
        }
    }
    let targets: Vec<f64> = train_rows.iter().filter_map(|d| d.target).collect();

    let split = train_valid_split(train_matrix.len(), config.valid_size, config.split_seed)
        .context("splitting training rows")?;
    let train_raw = take(&train_matrix, &split.train);
    let valid_raw = take(&train_matrix, &split.valid);

    let scaler = StandardScaler::fit(&train_raw).context("fitting standardization")?;
    let prepared = PreparedFeatures {
        feature_names: schema.names().to_vec(),
        test_ids: test_rows.iter().map(|d| d.id.clone()).collect(),
        test: scaler.transform(&test_matrix)?,
        train: scaler.transform(&train_raw)?,
        valid: scaler.transform(&valid_raw)?,
        train_targets: take(&targets, &split.train),
        valid_targets: take(&targets, &split.valid),
        scaler,
        imputer,
    };
    info!(
        features = prepared.feature_count(),
        train = prepared.train.len(),
        valid = prepared.valid.len(),
        test = prepared.test.len(),
        "prepared feature matrices"
    );
    Ok(prepared)
}

/// Bucketizer stage: fit on training targets, label training and validation targets.
pub fn bucketize(
    train_targets: &[f64],
    valid_targets: &[f64],
    bucket_count: usize,
    mode: LabelMode,
) -> TripResult<BucketizedTargets> {
    let buckets = Buckets::fit(train_targets, bucket_count)?;
    let train_labels = buckets.labels(train_targets, mode)?;
    let valid_labels = buckets.labels(valid_targets, mode)?;
    debug!(buckets = buckets.len(), %mode, "bucketized targets");
    Ok(BucketizedTargets {
        buckets,
        train_labels,
        valid_labels,
    })
}

/// Cache key of the feature stage. The data directory is deliberately absent.
pub fn features_key(trainset: &str, testset: &str, config: &PipelineConfig) -> CacheKey {
    CacheKey::new("load_data")
        .arg("trainset", trainset)
        .arg("testset", testset)
        .arg("valid_size", config.valid_size)
        .arg("geohash_precision", config.geohash_precision)
        .arg("cluster_count", config.cluster_count)
        .arg("pca_outlier_std", config.pca_outlier_std)
        .arg("split_seed", config.split_seed)
        .arg("kmeans_batch_size", config.kmeans_batch_size)
        .arg("kmeans_max_iter", config.kmeans_max_iter)
        .arg("kmeans_seed", config.kmeans_seed)
}

pub fn bucketize_key(
    train_targets: &[f64],
    valid_targets: &[f64],
    bucket_count: usize,
    mode: LabelMode,
) -> CacheKey {
    CacheKey::new("bucketize")
        .arg_f64s("train_targets", train_targets)
        .arg_f64s("valid_targets", valid_targets)
        .arg("bucket_count", bucket_count)
        .arg("labels", mode)
}

/// Both pipeline stages behind one result cache.
#[derive(Debug)]
pub struct Pipeline<S> {
    cache: ResultCache<S>,
    config: PipelineConfig,
}

impl<S: CacheStore> Pipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self {
            cache: ResultCache::new(store),
            config,
        }
    }

    pub fn cache(&self) -> &ResultCache<S> {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn load(&self, datadir: &Path, trainset: &str, testset: &str) -> Result<LoadedData> {
        self.config.validate()?;
        let key = features_key(trainset, testset, &self.config);
        let features: PreparedFeatures = self.cache.get_or_compute(&key, || {
            prepare_features(datadir, trainset, testset, &self.config)
        })?;

        let key = bucketize_key(
            &features.train_targets,
            &features.valid_targets,
            self.config.output_size,
            self.config.labels,
        );
        let labels: BucketizedTargets = self
            .cache
            .get_or_compute(&key, || {
                bucketize(
                    &features.train_targets,
                    &features.valid_targets,
                    self.config.output_size,
                    self.config.labels,
                )
            })
            .context("bucketizing targets")?;

        Ok(LoadedData { features, labels })
    }
}

/// Where the pipeline reads data and keeps its cache: the data directory
/// itself, or its scratch copy when the input is read-only.
pub fn working_dir(datadir: &Path, config: &PipelineConfig) -> Result<PathBuf> {
    if config.cache_read_only {
        copy_data_dir(datadir, &config.scratch_dir).with_context(|| {
            format!(
                "copying read-only data directory {} to {}",
                datadir.display(),
                config.scratch_dir.display()
            )
        })?;
        Ok(config.scratch_dir.clone())
    } else {
        Ok(datadir.to_path_buf())
    }
}

/// Run the cached pipeline with its on-disk cache under `<datadir>/cache`.
pub fn load_data(
    datadir: &Path,
    trainset: &str,
    testset: &str,
    config: &PipelineConfig,
) -> Result<LoadedData> {
    config.validate()?;
    let workdir = working_dir(datadir, config)?;
    let pipeline = Pipeline::new(DiskStore::new(workdir.join("cache")), config.clone());
    let data = pipeline.load(&workdir, trainset, testset)?;
    info!(
        hits = pipeline.cache().hits(),
        misses = pipeline.cache().misses(),
        "pipeline finished"
    );
    Ok(data)
}
