//! File collection over dataset roots
//!
//! Walks every dataset root in order and yields one `FileDescriptor` per
//! regular file. Entries within a directory are visited in file-name order,
//! so the sequence (and therefore batch membership and archive names) is
//! stable across re-runs over an unchanged tree.
//!
//! With an archived-file filter attached, each candidate is looked up in the
//! catalog and dropped if it already points at an archive. A failed lookup
//! disables the filter for the rest of the run instead of failing it.

use crate::collect::types::{DatasetRoot, FileDescriptor};
use crate::db::Catalog;
use crate::error::CollectError;
use crate::report::RunReport;
use tracing::debug;
use walkdir::WalkDir;

/// Collects archivable files from dataset roots
pub struct FileCollector<'a> {
    roots: &'a [DatasetRoot],
    archived_filter: Option<&'a Catalog>,
}

impl<'a> FileCollector<'a> {
    /// Create a collector over the given roots
    pub fn new(roots: &'a [DatasetRoot]) -> Self {
        Self {
            roots,
            archived_filter: None,
        }
    }

    /// Exclude files the catalog already associates with an archive
    pub fn with_archived_filter(mut self, catalog: &'a Catalog) -> Self {
        self.archived_filter = Some(catalog);
        self
    }

    /// Walk all roots and return the collected files in traversal order
    pub fn collect(&self, report: &mut RunReport) -> Vec<FileDescriptor> {
        let mut filter = self.archived_filter;
        let mut files = Vec::new();

        for root in self.roots {
            debug!(dataset = %root.id, path = %root.path.display(), "Collecting dataset");

            for entry in WalkDir::new(&root.path)
                .follow_links(false)
                .sort_by_file_name()
            {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        report.file_unreadable(CollectError::WalkFailed {
                            path: e.path().unwrap_or(&root.path).to_path_buf(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                let file_type = entry.file_type();
                if file_type.is_dir() {
                    continue;
                }
                if !file_type.is_file() {
                    debug!(path = %entry.path().display(), "Skipping non-regular file");
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(md) => md,
                    Err(e) => {
                        report.file_unreadable(CollectError::StatFailed {
                            path: entry.path().to_path_buf(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                let Some(desc) = FileDescriptor::from_metadata(entry.path(), root, &metadata) else {
                    report.file_unreadable(CollectError::StatFailed {
                        path: entry.path().to_path_buf(),
                        reason: "path is not valid UTF-8".into(),
                    });
                    continue;
                };

                if let Some(catalog) = filter {
                    match catalog.is_archived(&desc.dataset_id, &desc.relative_path) {
                        Ok(true) => {
                            report.file_already_archived(&desc.dataset_id, &desc.relative_path);
                            continue;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            report.catalog_failed("archived-file check (disabled for this run)", &e);
                            filter = None;
                        }
                    }
                }

                report.file_collected(desc.size);
                files.push(desc);
            }
        }

        files
    }
}
