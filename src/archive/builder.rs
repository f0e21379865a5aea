//! Container builder
//!
//! Turns a batch into a tar container in the output directory, or, in
//! deferred mode, into a manifest that a later `build` invocation turns into
//! the same container.
//!
//! # Commit protocol
//!
//! 1. The container is streamed to `<name>.tar.partial`
//! 2. The partial file is synced and renamed to `<name>.tar`
//! 3. The member-listing dump `<name>.mbr` is written
//!
//! The dump is the completion marker: a build whose dump exists is never
//! redone, and a crash before step 3 leaves nothing that looks committed.

use crate::archive::listing::{write_listing, MemberEntry};
use crate::archive::manifest::{read_manifest, write_manifest};
use crate::archive::naming::{archive_name, ArchivePaths};
use crate::batch::Batch;
use crate::collect::types::{to_slash_path, DatasetRoot, FileDescriptor};
use crate::error::{ArchiveError, ArchiveResult, CollectError};
use crate::report::RunReport;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A container committed in this run
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub paths: ArchivePaths,
    /// Members actually written, in container order
    pub members: Vec<MemberEntry>,
    /// Sum of member sizes
    pub byte_size: u64,
}

/// Result of building one archive
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// Container and listing written now
    Built(BuiltArchive),
    /// Listing already existed, nothing written
    AlreadyBuilt(ArchivePaths),
}

impl BuildOutcome {
    pub fn paths(&self) -> &ArchivePaths {
        match self {
            BuildOutcome::Built(built) => &built.paths,
            BuildOutcome::AlreadyBuilt(paths) => paths,
        }
    }
}

/// Writes containers and manifests for batches
pub struct ArchiveBuilder {
    output_dir: PathBuf,
    root: PathBuf,
}

impl ArchiveBuilder {
    /// Create a builder
    ///
    /// Member names are host paths made relative to `root`; every file, side
    /// file and partial container goes into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            root: root.into(),
        }
    }

    /// Paths of the archive a batch maps to
    pub fn paths_for(&self, batch: &Batch) -> ArchivePaths {
        let name = archive_name(&batch.dataset_ids(), batch.index, batch.len());
        ArchivePaths::new(&self.output_dir, &name)
    }

    /// Build the container for a batch (immediate mode)
    pub fn build(&self, batch: &Batch, report: &mut RunReport) -> ArchiveResult<BuildOutcome> {
        let paths = self.paths_for(batch);
        self.build_members(paths, batch.members(), report)
    }

    /// Write the manifest for a batch (deferred mode)
    pub fn write_manifest(&self, batch: &Batch, report: &mut RunReport) -> ArchiveResult<ArchivePaths> {
        let paths = self.paths_for(batch);

        let mut names = Vec::with_capacity(batch.len());
        for desc in batch.members() {
            match self.member_name(&desc.path) {
                Ok(name) => names.push(name),
                Err(e) => report.member_failed(&desc.path, &e),
            }
        }
        if names.is_empty() {
            return Err(ArchiveError::Empty { name: paths.name });
        }

        write_manifest(&paths.manifest, &names)?;
        report.manifest_written(&paths.name, names.len());
        Ok(paths)
    }

    /// Build the container described by a manifest (deferred mode)
    ///
    /// The archive name is the manifest's file stem. Members that vanished
    /// or stopped being regular files since the manifest was written are
    /// skipped.
    pub fn build_from_manifest(&self, manifest: &Path, report: &mut RunReport) -> ArchiveResult<BuildOutcome> {
        let paths = ArchivePaths::from_side_file(manifest, Some(&self.output_dir)).ok_or_else(|| {
            ArchiveError::Manifest {
                path: manifest.to_path_buf(),
                reason: "cannot derive an archive name from the file name".into(),
            }
        })?;

        if paths.is_built() {
            report.archive_already_built(&paths.name);
            return Ok(BuildOutcome::AlreadyBuilt(paths));
        }

        let names = read_manifest(manifest)?;
        let members: Vec<FileDescriptor> = names
            .iter()
            .filter_map(|name| self.resolve_member(name, report))
            .collect();

        self.build_members(paths, &members, report)
    }

    fn build_members(
        &self,
        paths: ArchivePaths,
        members: &[FileDescriptor],
        report: &mut RunReport,
    ) -> ArchiveResult<BuildOutcome> {
        if paths.is_built() {
            report.archive_already_built(&paths.name);
            return Ok(BuildOutcome::AlreadyBuilt(paths));
        }

        let entries = match self.write_container(&paths, members, report) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = fs::remove_file(&paths.partial);
                return Err(e);
            }
        };

        write_listing(&paths.listing, &entries)?;

        let byte_size = entries.iter().map(|m| m.size).sum();
        report.archive_built(&paths.name, entries.len(), byte_size);
        Ok(BuildOutcome::Built(BuiltArchive {
            paths,
            members: entries,
            byte_size,
        }))
    }

    fn write_container(
        &self,
        paths: &ArchivePaths,
        members: &[FileDescriptor],
        report: &mut RunReport,
    ) -> ArchiveResult<Vec<MemberEntry>> {
        let commit_err = |e: io::Error| ArchiveError::Commit {
            path: paths.container.clone(),
            reason: e.to_string(),
        };

        let file = File::create(&paths.partial).map_err(commit_err)?;
        let mut tar = tar::Builder::new(BufWriter::new(file));
        let mut entries = Vec::with_capacity(members.len());

        for desc in members {
            match self.append_member(&mut tar, desc, paths) {
                Ok(entry) => entries.push(entry),
                Err(e) if e.is_recoverable() => report.member_failed(&desc.path, &e),
                Err(e) => return Err(e),
            }
        }

        if entries.is_empty() {
            return Err(ArchiveError::Empty {
                name: paths.name.clone(),
            });
        }

        let file = tar
            .into_inner()
            .map_err(commit_err)?
            .into_inner()
            .map_err(|e| commit_err(e.into_error()))?;
        file.sync_all().map_err(commit_err)?;
        fs::rename(&paths.partial, &paths.container).map_err(commit_err)?;

        Ok(entries)
    }

    fn append_member<W: Write>(
        &self,
        tar: &mut tar::Builder<W>,
        desc: &FileDescriptor,
        paths: &ArchivePaths,
    ) -> ArchiveResult<MemberEntry> {
        let name = self.member_name(&desc.path)?;

        let file = File::open(&desc.path).map_err(|e| ArchiveError::MemberAdd {
            path: desc.path.clone(),
            reason: e.to_string(),
        })?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(desc.size);
        header.set_mode(desc.permissions().bits());
        header.set_uid(u64::from(desc.uid));
        header.set_gid(u64::from(desc.gid));
        header.set_mtime(desc.mtime.max(0) as u64);

        // Zero-pad a file that shrank after it was stat'ed so the header size stays true
        let data = file.take(desc.size).chain(io::repeat(0)).take(desc.size);
        tar.append_data(&mut header, &name, data)
            .map_err(|e| ArchiveError::Commit {
                path: paths.container.clone(),
                reason: format!("{}: {}", name, e),
            })?;

        debug!(archive = %paths.name, member = %name, size = desc.size, "Added member");
        Ok(MemberEntry::from_descriptor(desc, name))
    }

    /// Archive-relative name of a host path
    fn member_name(&self, path: &Path) -> ArchiveResult<String> {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(to_slash_path)
            .ok_or_else(|| ArchiveError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
    }

    /// Stat a manifest member under the root
    fn resolve_member(&self, name: &str, report: &mut RunReport) -> Option<FileDescriptor> {
        let path = self.root.join(name);
        let dataset_id = name.split('/').next().filter(|s| !s.is_empty())?;
        let dataset = DatasetRoot {
            id: dataset_id.to_string(),
            path: self.root.join(dataset_id),
        };

        let metadata = match fs::metadata(&path) {
            Ok(md) => md,
            Err(e) => {
                report.file_unreadable(CollectError::StatFailed {
                    path,
                    reason: e.to_string(),
                });
                return None;
            }
        };
        if !metadata.is_file() {
            debug!(path = %path.display(), "Skipping non-regular manifest entry");
            return None;
        }

        FileDescriptor::from_metadata(&path, &dataset, &metadata)
    }
}
