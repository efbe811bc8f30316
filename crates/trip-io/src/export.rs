use anyhow::{bail, Context, Result};
use polars::prelude::*;
use serde_json::json;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

use trip_core::{Buckets, Labels};

/// One feature matrix plus whatever per-row columns travel with it.
#[derive(Debug, Clone, Copy)]
pub struct MatrixExport<'a> {
    pub names: &'a [String],
    pub rows: &'a [Vec<f64>],
    pub ids: Option<&'a [String]>,
    pub targets: Option<&'a [f64]>,
    pub labels: Option<&'a Labels>,
}

impl<'a> MatrixExport<'a> {
    pub fn new(names: &'a [String], rows: &'a [Vec<f64>]) -> Self {
        Self {
            names,
            rows,
            ids: None,
            targets: None,
            labels: None,
        }
    }

    pub fn with_ids(mut self, ids: &'a [String]) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_targets(mut self, targets: &'a [f64]) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_labels(mut self, labels: &'a Labels) -> Self {
        self.labels = Some(labels);
        self
    }
}

/// Build a frame: `id`, the feature columns in schema order, `target`, then
/// `label` (hard) or `label_0..label_{k-1}` (soft).
pub fn matrix_frame(export: &MatrixExport<'_>) -> Result<DataFrame> {
    let height = export.rows.len();
    let check = |what: &str, len: usize| -> Result<()> {
        if len != height {
            bail!("{what} has {len} rows but the matrix has {height}");
        }
        Ok(())
    };

    let mut columns = Vec::with_capacity(export.names.len() + 3);
    if let Some(ids) = export.ids {
        check("id column", ids.len())?;
        columns.push(Series::new("id", ids));
    }
    for (col, name) in export.names.iter().enumerate() {
        let mut values = Vec::with_capacity(height);
        for (idx, row) in export.rows.iter().enumerate() {
            let value = row.get(col).with_context(|| {
                format!(
                    "row {idx} has {} columns, expected {}",
                    row.len(),
                    export.names.len()
                )
            })?;
            values.push(*value);
        }
        columns.push(Series::new(name, values));
    }
    if let Some(targets) = export.targets {
        check("target column", targets.len())?;
        columns.push(Series::new("target", targets));
    }
    match export.labels {
        Some(Labels::Hard(labels)) => {
            check("label column", labels.len())?;
            let labels: Vec<i64> = labels.iter().map(|l| *l as i64).collect();
            columns.push(Series::new("label", labels));
        }
        Some(Labels::Soft(labels)) => {
            check("label columns", labels.len())?;
            let width = labels.first().map(|p| p.len()).unwrap_or(0);
            for class in 0..width {
                let probs: Vec<f64> = labels.iter().map(|p| p[class]).collect();
                columns.push(Series::new(&format!("label_{class}"), probs));
            }
        }
        None => {}
    }
    DataFrame::new(columns).context("assembling matrix frame")
}

pub fn staged_output_path(output: &Path, stage: &str) -> PathBuf {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let file_name = output.file_name().unwrap_or_else(|| OsStr::new("output"));
    parent.join(stage).join(file_name)
}

/// Write `export` as CSV under `parent/stage/` and move it to `output`.
pub fn write_matrix_csv(export: &MatrixExport<'_>, output: &Path, stage: &str) -> Result<()> {
    let mut df = matrix_frame(export)?;
    let staged = prepare_stage(output, stage)?;
    let mut file =
        File::create(&staged).with_context(|| format!("creating {}", staged.display()))?;
    CsvWriter::new(&mut file)
        .finish(&mut df)
        .context("writing CSV file")?;
    drop(file);
    publish(&staged, output)?;
    info!(rows = df.height(), columns = df.width(), "wrote {}", output.display());
    Ok(())
}

/// Bucket maxima (`null` for the unbounded last bucket) and means.
pub fn write_buckets_json(buckets: &Buckets, output: &Path, stage: &str) -> Result<()> {
    let maxima: Vec<Option<f64>> = buckets
        .boundaries()
        .into_iter()
        .map(|b| b.is_finite().then_some(b))
        .collect();
    let doc = json!({
        "count": buckets.len(),
        "maxima": maxima,
        "means": buckets.means(),
    });
    write_staged(&serde_json::to_vec_pretty(&doc)?, output, stage)
}

/// Write `bytes` under `parent/stage/` and move them to `output`.
pub fn write_staged(bytes: &[u8], output: &Path, stage: &str) -> Result<()> {
    let staged = prepare_stage(output, stage)?;
    fs::write(&staged, bytes).with_context(|| format!("writing {}", staged.display()))?;
    publish(&staged, output)
}

fn prepare_stage(output: &Path, stage: &str) -> Result<PathBuf> {
    let staged = staged_output_path(output, stage);
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    Ok(staged)
}

// The stage directory sits beside `output`, so a rename never crosses devices.
fn publish(staged: &Path, output: &Path) -> Result<()> {
    fs::rename(staged, output)
        .with_context(|| format!("moving {} to {}", staged.display(), output.display()))?;
    if let Some(stage_dir) = staged.parent() {
        // Other exports may still be staging there.
        let _ = fs::remove_dir(stage_dir);
    }
    Ok(())
}
