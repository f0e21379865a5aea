//! Run reporting context
//!
//! Components never configure logging themselves. Each one receives a
//! `&mut RunReport`, records what happened through it, and the report emits
//! the matching `tracing` event. Tests inspect the counters directly.

use crate::error::CollectError;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters for every recoverable condition seen during a run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Dataset roots accepted
    pub datasets: u64,
    /// Dataset entries skipped because the directory does not exist
    pub datasets_missing: u64,
    /// Files yielded by the collector
    pub files_collected: u64,
    /// Bytes yielded by the collector
    pub bytes_collected: u64,
    /// Files excluded because the catalog says they are already archived
    pub files_already_archived: u64,
    /// Files or directory entries that could not be read
    pub files_unreadable: u64,
    /// Files larger than the maximum batch size
    pub files_oversized: u64,
    /// Batches closed below the minimum size to avoid overflow
    pub forced_closes: u64,
    /// Trailing batches merged into their predecessor
    pub trailing_merges: u64,
    /// Trailing merges that pushed a batch past the maximum size
    pub oversized_merges: u64,
    /// Archives written in this run
    pub archives_built: u64,
    /// Archives whose member listing already existed
    pub archives_already_built: u64,
    /// Manifests written in deferred mode
    pub manifests_written: u64,
    /// Batches abandoned because the container could not be committed
    pub batches_failed: u64,
    /// Members skipped while writing containers
    pub member_failures: u64,
    /// Archives recorded in the catalog
    pub archives_recorded: u64,
    /// Member associations pointed at their archive
    pub associations_updated: u64,
    /// Members whose dataset is not registered in the catalog, or whose
    /// name carries no dataset-relative path
    pub associations_skipped: u64,
    /// Datasets found to be unregistered while recording
    pub unregistered_datasets: BTreeSet<String>,
    /// Catalog operations that failed without aborting the run
    pub catalog_failures: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset_added(&mut self, dataset: &str, path: &Path) {
        self.datasets += 1;
        debug!(dataset, path = %path.display(), "Dataset root");
    }

    pub fn dataset_missing(&mut self, entry: &str) {
        self.datasets_missing += 1;
        warn!("Directory does not exist: {}", entry);
    }

    pub fn file_collected(&mut self, size: u64) {
        self.files_collected += 1;
        self.bytes_collected += size;
    }

    pub fn file_already_archived(&mut self, dataset: &str, relative: &str) {
        self.files_already_archived += 1;
        info!(dataset, file = relative, "Skipping archived file");
    }

    pub fn file_unreadable(&mut self, error: CollectError) {
        self.files_unreadable += 1;
        warn!("{}", error);
    }

    pub fn file_oversized(&mut self, path: &Path, size: u64, max_size: u64) {
        self.files_oversized += 1;
        warn!(
            path = %path.display(),
            size,
            "File is larger than max archive size ({} bytes), skipping",
            max_size
        );
    }

    pub fn forced_close(&mut self, members: usize, size: u64, min_size: u64) {
        self.forced_closes += 1;
        warn!(
            members,
            size,
            "Closing under-filled batch below min size ({} bytes) to avoid overflow",
            min_size
        );
    }

    pub fn trailing_merged(&mut self, members: usize, size: u64, merged_size: u64, max_size: u64) {
        self.trailing_merges += 1;
        info!(
            members,
            size, "Last batch below min size, appending to previous batch"
        );
        if merged_size > max_size {
            self.oversized_merges += 1;
            warn!(
                merged_size,
                "Merged batch exceeds max archive size ({} bytes)", max_size
            );
        }
    }

    pub fn archive_built(&mut self, name: &str, members: usize, bytes: u64) {
        self.archives_built += 1;
        info!(archive = name, members, bytes, "Archive written");
    }

    pub fn archive_already_built(&mut self, name: &str) {
        self.archives_already_built += 1;
        info!(archive = name, "Member listing exists, skipping build");
    }

    pub fn manifest_written(&mut self, name: &str, members: usize) {
        self.manifests_written += 1;
        info!(archive = name, members, "Manifest written");
    }

    pub fn batch_failed(&mut self, batch: usize, reason: impl Display) {
        self.batches_failed += 1;
        tracing::error!(batch, "Abandoning batch: {}", reason);
    }

    pub fn member_failed(&mut self, path: &Path, reason: impl Display) {
        self.member_failures += 1;
        warn!(path = %path.display(), "Failed to add member: {}", reason);
    }

    pub fn archive_recorded(&mut self, name: &str, archive_id: i64, updated: usize) {
        self.archives_recorded += 1;
        self.associations_updated += updated as u64;
        info!(archive = name, archive_id, associations = updated, "Archive recorded");
    }

    pub fn dataset_unregistered(&mut self, dataset: &str, members: usize) {
        self.associations_skipped += members as u64;
        if self.unregistered_datasets.insert(dataset.to_string()) {
            warn!(
                dataset,
                members, "Dataset has no member associations in catalog, skipping"
            );
        }
    }

    pub fn member_without_dataset(&mut self, archive: &str, member: &str) {
        self.associations_skipped += 1;
        warn!(archive, member, "Member name has no dataset-relative path, association not written");
    }

    pub fn catalog_failed(&mut self, context: &str, reason: impl Display) {
        self.catalog_failures += 1;
        warn!("Catalog {} failed: {}", context, reason);
    }
}
