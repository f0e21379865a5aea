//! Deferred-build manifests (`.batch`)
//!
//! Plain UTF-8 text, one root-relative member path per line. Blank lines are
//! ignored when reading so a hand-edited manifest still builds.

use crate::error::{ArchiveError, ArchiveResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a manifest
pub fn write_manifest<S: AsRef<str>>(path: &Path, names: &[S]) -> ArchiveResult<()> {
    let to_err = |e: std::io::Error| ArchiveError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut out = BufWriter::new(File::create(path).map_err(to_err)?);
    for name in names {
        writeln!(out, "{}", name.as_ref()).map_err(to_err)?;
    }
    let file = out.into_inner().map_err(|e| to_err(e.into_error()))?;
    file.sync_all().map_err(to_err)?;
    Ok(())
}

/// Read the member paths of a manifest, in file order
pub fn read_manifest(path: &Path) -> ArchiveResult<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| ArchiveError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
