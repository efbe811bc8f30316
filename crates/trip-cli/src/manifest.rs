use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance of one `tripdur` run, written next to its outputs.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub status: String,
    pub duration_ms: Option<u128>,
    pub outputs: Vec<String>,
    pub params: Vec<Param>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

/// Write `run-<uuid>.json` into `out_dir` and return its path.
pub fn record_manifest(
    out_dir: &Path,
    command: &str,
    params: &[(&str, &str)],
    outputs: &[String],
    status: &str,
    duration_ms: Option<u128>,
) -> Result<std::path::PathBuf> {
    let run_id = Uuid::new_v4().to_string();
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let manifest = ManifestEntry {
        run_id: run_id.clone(),
        command: command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        status: status.to_string(),
        duration_ms,
        outputs: outputs.to_vec(),
        params: params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = out_dir.join(format!("run-{run_id}.json"));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let manifest = serde_json::from_str(&json)?;
    Ok(manifest)
}
