use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tracing::info;

use trip_algo::{load_data, LoadedData};
use trip_cli::{config::resolve_config, PrepareArgs};
use trip_io::{write_buckets_json, write_matrix_csv, MatrixExport};

use crate::commands::telemetry::record_run_timed;

const EXPORT_STAGE: &str = "prepare";

/// Handle `tripdur prepare`: run the cached pipeline and optionally export it.
///
/// With `--out DIR` the matrices land in `DIR/train.csv`, `DIR/valid.csv`
/// and `DIR/test.csv` (feature columns in schema order plus id, target and
/// label columns) and the buckets in `DIR/buckets.json`, with a run manifest
/// beside them.
pub fn handle(args: &PrepareArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let start = Instant::now();
    info!(
        datadir = %args.datadir.display(),
        buckets = config.output_size,
        labels = %config.labels,
        "preparing features"
    );

    let mut outputs = Vec::new();
    let res = (|| -> Result<()> {
        let data = load_data(&args.datadir, &args.trainset, &args.testset, &config)?;
        println!(
            "Prepared {} features: {} train, {} valid, {} test rows; {} buckets ({} labels)",
            data.feature_count(),
            data.features.train.len(),
            data.features.valid.len(),
            data.features.test.len(),
            data.labels.buckets.len(),
            config.labels,
        );
        if let Some(out) = &args.out {
            outputs = export(&data, out)?;
            println!("Wrote {} files to {}", outputs.len(), out.display());
        }
        Ok(())
    })();

    if let Some(out) = &args.out {
        let valid_size = config.valid_size.to_string();
        let buckets = config.output_size.to_string();
        let precision = config.geohash_precision.to_string();
        let seed = config.split_seed.to_string();
        let labels = config.labels.to_string();
        let datadir = args.datadir.display().to_string();
        let params = [
            ("datadir", datadir.as_str()),
            ("trainset", args.trainset.as_str()),
            ("testset", args.testset.as_str()),
            ("valid_size", valid_size.as_str()),
            ("buckets", buckets.as_str()),
            ("precision", precision.as_str()),
            ("seed", seed.as_str()),
            ("labels", labels.as_str()),
        ];
        record_run_timed(out, "prepare", &params, &outputs, start, &res);
    }
    res
}

fn export(data: &LoadedData, out: &Path) -> Result<Vec<String>> {
    let features = &data.features;
    let labels = &data.labels;
    let names = &features.feature_names;

    let train = out.join("train.csv");
    write_matrix_csv(
        &MatrixExport::new(names, &features.train)
            .with_targets(&features.train_targets)
            .with_labels(&labels.train_labels),
        &train,
        EXPORT_STAGE,
    )?;
    let valid = out.join("valid.csv");
    write_matrix_csv(
        &MatrixExport::new(names, &features.valid)
            .with_targets(&features.valid_targets)
            .with_labels(&labels.valid_labels),
        &valid,
        EXPORT_STAGE,
    )?;
    let test = out.join("test.csv");
    write_matrix_csv(
        &MatrixExport::new(names, &features.test).with_ids(&features.test_ids),
        &test,
        EXPORT_STAGE,
    )?;
    let buckets = out.join("buckets.json");
    write_buckets_json(&labels.buckets, &buckets, EXPORT_STAGE)?;

    Ok([train, valid, test, buckets]
        .iter()
        .map(|p| p.display().to_string())
        .collect())
}
