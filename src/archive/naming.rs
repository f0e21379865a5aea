//! Deterministic archive naming
//!
//! An archive name is derived from the datasets in its batch, the batch's
//! ordinal in the run and its member count, e.g. `ds084.1_ds083.2_part3_120files`.
//! The name is the catalog idempotency key, so it must not depend on anything
//! but the batch contents and position.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Container file suffix (also the catalog format tag)
pub const CONTAINER_SUFFIX: &str = "tar";

/// Deferred-build manifest suffix
pub const MANIFEST_SUFFIX: &str = "batch";

/// Member-listing dump suffix
pub const LISTING_SUFFIX: &str = "mbr";

/// Suffix of a container that has not been committed yet
pub const PARTIAL_SUFFIX: &str = "partial";

/// Above this many datasets the name collapses to `<first>_dn<count>`
pub const MAX_NAMED_DATASETS: usize = 3;

/// Build the archive name for a batch
pub fn archive_name<S>(dataset_ids: &BTreeSet<S>, index: usize, member_count: usize) -> String
where
    S: AsRef<str> + Ord,
{
    let prefix = match dataset_ids.len() {
        0 => "batch".to_string(),
        n if n > MAX_NAMED_DATASETS => {
            let first = dataset_ids.iter().next().map(|s| s.as_ref()).unwrap_or("batch");
            format!("{}_dn{}", first, n)
        }
        _ => dataset_ids.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("_"),
    };
    format!("{}_part{}_{}files", prefix, index, member_count)
}

/// Locations of every file belonging to one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    /// Archive name
    pub name: String,
    /// Finished container
    pub container: PathBuf,
    /// Container while it is being written
    pub partial: PathBuf,
    /// Deferred-build manifest
    pub manifest: PathBuf,
    /// Member-listing dump
    pub listing: PathBuf,
}

impl ArchivePaths {
    /// Paths for `name` inside `dir`
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            container: dir.join(format!("{}.{}", name, CONTAINER_SUFFIX)),
            partial: dir.join(format!("{}.{}.{}", name, CONTAINER_SUFFIX, PARTIAL_SUFFIX)),
            manifest: dir.join(format!("{}.{}", name, MANIFEST_SUFFIX)),
            listing: dir.join(format!("{}.{}", name, LISTING_SUFFIX)),
        }
    }

    /// Paths for the archive a side file (manifest or listing) belongs to
    ///
    /// The archive name is the file name minus its suffix; files are placed
    /// in `dir` if given, otherwise next to `side_file`.
    pub fn from_side_file(side_file: &Path, dir: Option<&Path>) -> Option<Self> {
        let name = side_file.file_stem()?.to_str()?;
        let dir = match dir {
            Some(d) => d,
            None => side_file.parent()?,
        };
        Some(Self::new(dir, name))
    }

    /// True when the member-listing dump exists (build complete)
    pub fn is_built(&self) -> bool {
        self.listing.is_file()
    }
}
