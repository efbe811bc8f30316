use std::{path::Path, time::Instant};

use tracing::{info, warn};
use trip_cli::manifest::record_manifest;

/// Record a run manifest in `out_dir`; failures are logged, never fatal.
pub fn record_run_timed(
    out_dir: &Path,
    command: &str,
    params: &[(&str, &str)],
    outputs: &[String],
    start: Instant,
    result: &anyhow::Result<()>,
) {
    let status = if result.is_ok() { "success" } else { "failure" };
    let duration_ms = Some(start.elapsed().as_millis());
    match record_manifest(out_dir, command, params, outputs, status, duration_ms) {
        Ok(path) => info!("recorded run manifest {}", path.display()),
        Err(err) => warn!("failed to record run manifest: {err:#}"),
    }
}
