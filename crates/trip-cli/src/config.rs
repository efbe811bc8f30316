//! Pipeline settings from an optional TOML file plus command-line overrides.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use trip_core::PipelineConfig;

use crate::cli::PrepareArgs;

/// Read a pipeline config; missing keys take their defaults.
pub fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Config file (if any) with flags applied on top, validated.
pub fn resolve_config(args: &PrepareArgs) -> Result<PipelineConfig> {
    let mut config = load_pipeline_config(args.config.as_deref())?;
    if let Some(v) = args.valid_size {
        config.valid_size = v;
    }
    if let Some(v) = args.buckets {
        config.output_size = v;
    }
    if args.cache_read_only {
        config.cache_read_only = true;
    }
    if let Some(v) = &args.scratch_dir {
        config.scratch_dir = v.clone();
    }
    if let Some(v) = args.precision {
        config.geohash_precision = v;
    }
    if let Some(v) = args.clusters {
        config.cluster_count = v;
    }
    if let Some(v) = args.outlier_std {
        config.pca_outlier_std = v;
    }
    if let Some(v) = args.seed {
        config.split_seed = v;
    }
    if let Some(v) = args.labels {
        config.labels = v;
    }
    config.validate()?;
    Ok(config)
}
