//! Scratch copies of a read-only data directory.
//!
//! The copy is staged in a sibling temporary directory and renamed into
//! place only once every file has landed, so `dest` either holds a complete
//! dataset (marked by [`COPY_MARKER`]) or does not exist. The marker records
//! the canonical source path; a copy is only reused for the same source.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use trip_core::TripError;

pub const COPY_MARKER: &str = ".copy-complete";

/// Copy `src` to `dest`. A previous complete copy of the same `src` is
/// reused as is; a copy of any other directory is refused.
pub fn copy_data_dir(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        bail!(TripError::Load(format!(
            "data directory {} does not exist",
            src.display()
        )));
    }
    let source = src
        .canonicalize()
        .with_context(|| format!("resolving {}", src.display()))?;
    let marker = dest.join(COPY_MARKER);
    if marker.is_file() {
        let recorded =
            fs::read_to_string(&marker).with_context(|| format!("reading {}", marker.display()))?;
        if Path::new(recorded.trim_end()) != source {
            bail!(occupied(
                dest,
                &format!("holds a copy of '{}', not '{}'", recorded.trim_end(), source.display())
            ));
        }
        info!("reusing data copy at {}", dest.display());
        return Ok(());
    }
    if dest.exists() {
        bail!(occupied(dest, "exists but is not a complete data copy"));
    }

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("creating directory '{}'", parent.display()))?;
    // Dropping the staging directory on any early return removes the partial copy.
    let staging = tempfile::Builder::new()
        .prefix(".datadir-copy")
        .tempdir_in(parent)
        .with_context(|| format!("creating staging directory in {}", parent.display()))?;

    let mut files = 0usize;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("resolving {}", entry.path().display()))?;
        let target = staging.path().join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copying {} to {}", entry.path().display(), target.display())
            })?;
            files += 1;
        }
    }
    let recorded = source.to_string_lossy();
    fs::write(staging.path().join(COPY_MARKER), recorded.as_bytes())
        .context("writing copy marker")?;

    let staged = staging.keep();
    if let Err(err) = fs::rename(&staged, dest) {
        let _ = fs::remove_dir_all(&staged);
        return Err(err)
            .with_context(|| format!("moving {} into {}", staged.display(), dest.display()));
    }
    debug!(files, "copied data directory");
    info!("copied {} to {}", src.display(), dest.display());
    Ok(())
}

fn occupied(dest: &Path, reason: &str) -> TripError {
    TripError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("{} {reason}; remove it and retry", dest.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copies_nested_tree_and_marks_it() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("osrm")).unwrap();
        fs::write(src.path().join("train.csv"), "id\n1\n").unwrap();
        fs::write(src.path().join("osrm/routes.csv"), "id\n1\n").unwrap();

        let scratch = tempdir().unwrap();
        let dest = scratch.path().join("cache");
        copy_data_dir(src.path(), &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("train.csv")).unwrap(), "id\n1\n");
        assert!(dest.join("osrm/routes.csv").is_file());
        assert!(dest.join(COPY_MARKER).is_file());
        // No staging directories left behind.
        let leftovers: Vec<_> = fs::read_dir(scratch.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".datadir-copy"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn reuses_complete_copy() {
        let src = tempdir().unwrap();
        fs::write(src.path().join("train.csv"), "a").unwrap();
        let scratch = tempdir().unwrap();
        let dest = scratch.path().join("cache");
        copy_data_dir(src.path(), &dest).unwrap();
        fs::write(dest.join("extra"), "kept").unwrap();
        copy_data_dir(src.path(), &dest).unwrap();
        assert!(dest.join("extra").is_file());
    }

    #[test]
    fn refuses_copy_of_another_source() {
        let first = tempdir().unwrap();
        fs::write(first.path().join("train.csv"), "from-first").unwrap();
        let second = tempdir().unwrap();
        fs::write(second.path().join("train.csv"), "from-second").unwrap();
        let scratch = tempdir().unwrap();
        let dest = scratch.path().join("cache");

        copy_data_dir(first.path(), &dest).unwrap();
        let err = copy_data_dir(second.path(), &dest).unwrap_err();
        assert!(matches!(err.downcast_ref::<TripError>(), Some(TripError::Io(_))));
        assert!(err.to_string().contains("remove it and retry"), "{err}");
        assert_eq!(fs::read_to_string(dest.join("train.csv")).unwrap(), "from-first");
    }

    #[test]
    fn marker_records_canonical_source() {
        let src = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let dest = scratch.path().join("cache");
        copy_data_dir(src.path(), &dest).unwrap();
        let recorded = fs::read_to_string(dest.join(COPY_MARKER)).unwrap();
        assert_eq!(Path::new(&recorded), src.path().canonicalize().unwrap());
    }

    #[test]
    fn refuses_incomplete_destination() {
        let src = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let dest = scratch.path().join("cache");
        fs::create_dir_all(&dest).unwrap();
        let err = copy_data_dir(src.path(), &dest).unwrap_err();
        assert!(err.to_string().contains("not a complete data copy"));
    }

    #[test]
    fn missing_source_fails() {
        let scratch = tempdir().unwrap();
        let err = copy_data_dir(&scratch.path().join("nope"), &scratch.path().join("d"))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TripError>(), Some(TripError::Load(_))));
    }
}
