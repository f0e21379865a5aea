//! Run coordinator - drives collection, batching, building and recording
//!
//! A packing run is strictly sequential:
//!
//! ```text
//! dataset roots ─► FileCollector ─► Batcher ─► for each batch:
//!                                               ArchiveBuilder ─► checksum ─► CatalogWriter
//! ```
//!
//! All files are batched before the first container is written. The
//! shutdown flag is checked between batches, never inside one, so an
//! interrupted run leaves only committed containers (or `.partial` files
//! that are rewritten on the next run).

use crate::archive::{read_listing, ArchiveBuilder, ArchivePaths};
use crate::batch::Batcher;
use crate::collect::{check_root, common_parent, resolve_roots, FileCollector};
use crate::config::{BuildConfig, PackConfig, RecordConfig, RegisterConfig};
use crate::content::checksum_file;
use crate::db::{ArchiveRecord, Catalog, CatalogWriter, RecordOutcome};
use crate::error::{ArchiveError, ArchiverError, DbError, DbResult, Result};
use crate::progress::ProgressReporter;
use crate::report::RunReport;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of a completed pack or build run
#[derive(Debug)]
pub struct RunResult {
    /// Everything counted during the run
    pub report: RunReport,

    /// Batches (or manifests) considered
    pub batches: usize,

    /// Archives or manifests produced or found complete, in batch order
    pub archives: Vec<ArchivePaths>,

    /// Time taken
    pub duration: Duration,

    /// Whether the run completed (vs was interrupted)
    pub completed: bool,
}

/// Coordinates a packing run
pub struct PackCoordinator {
    config: PackConfig,
    shutdown: Arc<AtomicBool>,
}

impl PackCoordinator {
    pub fn new(config: PackConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run collection, batching and per-batch archiving
    pub fn run(self, progress: Option<&ProgressReporter>) -> Result<RunResult> {
        let start = Instant::now();
        let config = &self.config;
        let mut report = RunReport::new();

        let entries = config.inputs.load()?;
        let roots = resolve_roots(&entries, config.inputs.dataset_base.as_deref(), &mut report);
        if roots.is_empty() {
            return Err(ArchiverError::NothingToArchive { roots: 0 });
        }

        fs::create_dir_all(&config.output_dir)?;

        let mut catalog = match config.catalog_path {
            Some(ref path) if config.check_archived || config.record => open_catalog(path, &mut report),
            _ => None,
        };

        // Owner identity is required before anything is built
        let owner_id = match catalog {
            Some(ref cat) if config.record => Some(resolve_owner(cat, config.logname.as_deref())?),
            _ => None,
        };

        // Dataset roots are canonical, so the member-name root must be too
        let root = match config.root {
            Some(ref root) => root.canonicalize()?,
            None => common_parent(&roots).ok_or(ArchiverError::NothingToArchive { roots: roots.len() })?,
        };
        check_root(&root, &roots)?;
        info!(
            datasets = roots.len(),
            root = %root.display(),
            output = %config.output_dir.display(),
            deferred = config.deferred,
            "Starting packing run"
        );

        if let Some(p) = progress {
            p.set_status("Collecting files...");
        }
        let files = {
            let mut collector = FileCollector::new(&roots);
            if config.check_archived {
                if let Some(ref cat) = catalog {
                    collector = collector.with_archived_filter(cat);
                }
            }
            collector.collect(&mut report)
        };

        if files.is_empty() {
            if report.files_already_archived > 0 {
                info!(
                    skipped = report.files_already_archived,
                    "All files are already archived, nothing to do"
                );
                return Ok(RunResult {
                    report,
                    batches: 0,
                    archives: Vec::new(),
                    duration: start.elapsed(),
                    completed: true,
                });
            }
            return Err(ArchiverError::NothingToArchive { roots: roots.len() });
        }

        let batches = Batcher::batch_all(config.bounds, files, &mut report);
        info!(batches = batches.len(), "Files batched");

        let builder = ArchiveBuilder::new(&config.output_dir, &root);
        let mut archives = Vec::with_capacity(batches.len());
        let mut completed = true;

        for batch in &batches {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!(batch = batch.index, "Shutdown requested, stopping before batch");
                completed = false;
                break;
            }
            if let Some(p) = progress {
                p.update(&report, batch.index, batches.len());
            }

            if config.deferred {
                match builder.write_manifest(batch, &mut report) {
                    Ok(paths) => archives.push(paths),
                    Err(e) => report.batch_failed(batch.index, &e),
                }
                continue;
            }

            let outcome = match builder.build(batch, &mut report) {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.batch_failed(batch.index, &e);
                    continue;
                }
            };

            if let (Some(cat), Some(owner)) = (catalog.as_mut(), owner_id) {
                record_or_report(cat, outcome.paths(), owner, &mut report);
            }
            archives.push(outcome.paths().clone());
        }

        Ok(RunResult {
            report,
            batches: batches.len(),
            archives,
            duration: start.elapsed(),
            completed,
        })
    }
}

/// Build archives from deferred manifests
pub fn run_build(
    config: &BuildConfig,
    shutdown: &AtomicBool,
    progress: Option<&ProgressReporter>,
) -> Result<RunResult> {
    let start = Instant::now();
    let mut report = RunReport::new();

    let mut catalog = match config.catalog_path {
        Some(ref path) if config.record => open_catalog(path, &mut report),
        _ => None,
    };
    let owner_id = match catalog {
        Some(ref cat) => Some(resolve_owner(cat, config.logname.as_deref())?),
        None => None,
    };

    let mut archives = Vec::with_capacity(config.manifests.len());
    let mut completed = true;

    for (i, manifest) in config.manifests.iter().enumerate() {
        if shutdown.load(Ordering::SeqCst) {
            warn!(manifest = %manifest.display(), "Shutdown requested, stopping before manifest");
            completed = false;
            break;
        }
        if let Some(p) = progress {
            p.update(&report, i + 1, config.manifests.len());
        }

        let output_dir = match config.output_dir {
            Some(ref dir) => dir.clone(),
            None => manifest
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf(),
        };
        fs::create_dir_all(&output_dir)?;

        let builder = ArchiveBuilder::new(output_dir, &config.root);
        let outcome = match builder.build_from_manifest(manifest, &mut report) {
            Ok(outcome) => outcome,
            Err(e) => {
                report.batch_failed(i + 1, &e);
                continue;
            }
        };

        if let (Some(cat), Some(owner)) = (catalog.as_mut(), owner_id) {
            record_or_report(cat, outcome.paths(), owner, &mut report);
        }
        archives.push(outcome.paths().clone());
    }

    Ok(RunResult {
        report,
        batches: config.manifests.len(),
        archives,
        duration: start.elapsed(),
        completed,
    })
}

/// Record archives from their member listings
pub fn run_record(config: &RecordConfig) -> Result<RunReport> {
    let mut report = RunReport::new();
    let mut catalog = Catalog::open(&config.catalog_path)?;
    let owner_id = resolve_owner(&catalog, config.logname.as_deref())?;

    for listing in &config.listings {
        let Some(paths) = ArchivePaths::from_side_file(listing, None) else {
            report.catalog_failed(
                &format!("record of '{}'", listing.display()),
                "cannot derive an archive name from the file name",
            );
            continue;
        };
        // A listing given by path may not sit at the default location
        let paths = ArchivePaths {
            listing: listing.clone(),
            ..paths
        };

        if let Err(e) = record_archive(&mut catalog, &paths, owner_id, config.update_existing, &mut report) {
            report.catalog_failed(&format!("record of '{}'", paths.name), &e);
        }
    }

    Ok(report)
}

/// Register dataset inventories
pub fn run_register(config: &RegisterConfig) -> Result<RunReport> {
    let mut report = RunReport::new();
    let mut catalog = Catalog::open(&config.catalog_path)?;

    let entries = config.inputs.load()?;
    let roots = resolve_roots(&entries, config.inputs.dataset_base.as_deref(), &mut report);

    for root in &roots {
        let inserted = catalog.register_dataset(root, &mut report)?;
        info!(dataset = %root.id, new_members = inserted, "Dataset registered");
    }

    Ok(report)
}

/// Record one built archive from its member listing
///
/// The record is rebuilt from the `.mbr` dump so that immediate builds,
/// deferred builds and the `record` command all store the same thing. The
/// container is checksummed if it exists next to the listing.
pub fn record_archive(
    catalog: &mut Catalog,
    paths: &ArchivePaths,
    owner_id: i64,
    update_existing: bool,
    report: &mut RunReport,
) -> Result<RecordOutcome> {
    if !update_existing {
        if let Some(archive_id) = catalog.archive_id(&paths.name)? {
            info!(archive = %paths.name, archive_id, "Archive already recorded, not updating");
            return Ok(RecordOutcome::Skipped { archive_id });
        }
    }

    let members = read_listing(&paths.listing)?;

    let checksum = if paths.container.is_file() {
        let sum = checksum_file(&paths.container).map_err(|source| ArchiveError::Checksum {
            path: paths.container.clone(),
            source,
        })?;
        Some(sum)
    } else {
        warn!(archive = %paths.name, path = %paths.container.display(), "Container not found, recording without checksum");
        None
    };

    let record = ArchiveRecord::from_members(&paths.name, members, checksum, owner_id);
    let mut writer = CatalogWriter::new(catalog);
    if !update_existing {
        writer = writer.no_update();
    }
    Ok(writer.record(&record, report)?)
}

fn record_or_report(catalog: &mut Catalog, paths: &ArchivePaths, owner_id: i64, report: &mut RunReport) {
    if let Err(e) = record_archive(catalog, paths, owner_id, true, report) {
        report.catalog_failed(&format!("record of '{}'", paths.name), &e);
    }
}

/// Open the catalog for a run, or disable catalog features
fn open_catalog(path: &Path, report: &mut RunReport) -> Option<Catalog> {
    match Catalog::open(path) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            report.catalog_failed("open (catalog features disabled for this run)", &e);
            None
        }
    }
}

/// Login name from the override or the environment
pub fn resolve_logname(explicit: Option<&str>) -> DbResult<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("LOGNAME").ok())
        .or_else(|| std::env::var("USER").ok())
        .filter(|name| !name.is_empty())
        .ok_or(DbError::NoLogname)
}

/// Catalog user id of the run's owner
pub fn resolve_owner(catalog: &Catalog, logname: Option<&str>) -> DbResult<i64> {
    let logname = resolve_logname(logname)?;
    let owner_id = catalog.lookup_user(&logname)?;
    info!(logname = %logname, owner_id, "Resolved archive owner");
    Ok(owner_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_listing;
    use crate::archive::MemberEntry;
    use crate::batch::SizeBounds;
    use crate::collect::types::{EntryType, Permissions};
    use crate::config::DatasetInputs;
    use crate::error::ConfigError;
    use tempfile::tempdir;

    fn catalog_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("catalog.db");
        let catalog = Catalog::create(&path).unwrap();
        catalog.add_user("archiver", 42).unwrap();
        path
    }

    #[test]
    fn test_resolve_logname_explicit_wins() {
        assert_eq!(resolve_logname(Some("alice")).unwrap(), "alice");
    }

    #[test]
    fn test_resolve_owner_unknown_user() {
        let catalog = Catalog::open_in_memory().unwrap();
        let err = resolve_owner(&catalog, Some("nobody")).unwrap_err();
        assert!(matches!(err, DbError::UnknownUser { .. }));
    }

    #[test]
    fn test_record_archive_without_container() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let paths = ArchivePaths::new(dir.path(), "ds1_part1_1files");
        let member = MemberEntry {
            entry_type: EntryType::File,
            permissions: Permissions(0o640),
            owner: "1000".into(),
            group: "100".into(),
            size: 12,
            mtime: 0,
            name: "ds1/a.nc".into(),
        };
        write_listing(&paths.listing, &[member]).unwrap();

        let mut report = RunReport::new();
        let outcome = record_archive(&mut catalog, &paths, 1, true, &mut report).unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded { .. }));

        let checksum: Option<String> = catalog
            .conn()
            .query_row("SELECT checksum FROM archives WHERE name = ?1", [&paths.name], |row| row.get(0))
            .unwrap();
        assert_eq!(checksum, None);
    }

    #[test]
    fn test_pack_unknown_owner_is_fatal_before_build() {
        let dir = tempdir().unwrap();
        let ds = dir.path().join("data/ds1");
        fs::create_dir_all(&ds).unwrap();
        fs::write(ds.join("a.nc"), b"data").unwrap();
        let out = dir.path().join("out");

        let config = PackConfig {
            inputs: DatasetInputs {
                entries: vec![ds.display().to_string()],
                ..Default::default()
            },
            output_dir: out.clone(),
            bounds: SizeBounds::new(1, 1024),
            catalog_path: Some(catalog_file(dir.path())),
            record: true,
            logname: Some("stranger".into()),
            ..Default::default()
        };

        let err = PackCoordinator::new(config).run(None).unwrap_err();
        assert!(matches!(err, ArchiverError::Catalog(DbError::UnknownUser { .. })));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_pack_with_unavailable_catalog_still_builds() {
        let dir = tempdir().unwrap();
        let ds = dir.path().join("data/ds1");
        fs::create_dir_all(&ds).unwrap();
        fs::write(ds.join("a.nc"), b"data").unwrap();

        let config = PackConfig {
            inputs: DatasetInputs {
                entries: vec![ds.display().to_string()],
                ..Default::default()
            },
            output_dir: dir.path().join("out"),
            bounds: SizeBounds::new(1, 1024),
            catalog_path: Some(dir.path().join("missing.db")),
            check_archived: true,
            record: true,
            logname: Some("archiver".into()),
            ..Default::default()
        };

        let result = PackCoordinator::new(config).run(None).unwrap();
        assert_eq!(result.report.archives_built, 1);
        assert_eq!(result.report.archives_recorded, 0);
        assert_eq!(result.report.catalog_failures, 1);
    }

    #[test]
    fn test_pack_nothing_found_is_error() {
        let dir = tempdir().unwrap();
        let ds = dir.path().join("empty");
        fs::create_dir_all(&ds).unwrap();

        let config = PackConfig {
            inputs: DatasetInputs {
                entries: vec![ds.display().to_string()],
                ..Default::default()
            },
            output_dir: dir.path().join("out"),
            ..Default::default()
        };

        let err = PackCoordinator::new(config).run(None).unwrap_err();
        assert!(matches!(err, ArchiverError::NothingToArchive { roots: 1 }));
    }

    #[test]
    fn test_pack_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let ds = dir.path().join("data/ds1");
        fs::create_dir_all(&ds).unwrap();
        fs::write(ds.join("a.nc"), b"data").unwrap();

        let config = PackConfig {
            inputs: DatasetInputs {
                entries: vec![ds.display().to_string()],
                ..Default::default()
            },
            output_dir: dir.path().join("out"),
            bounds: SizeBounds::new(1, 1024),
            ..Default::default()
        };

        let coordinator = PackCoordinator::new(config);
        coordinator.shutdown_flag().store(true, Ordering::SeqCst);
        let result = coordinator.run(None).unwrap();

        assert!(!result.completed);
        assert!(result.archives.is_empty());
        assert_eq!(result.batches, 1);
    }

    fn pack_two_parents(dir: &Path, root: Option<std::path::PathBuf>) -> Result<RunResult> {
        let mut entries = Vec::new();
        for rel in ["data/a/ds1", "data/b/ds9"] {
            let ds = dir.join(rel);
            fs::create_dir_all(&ds).unwrap();
            fs::write(ds.join("f.nc"), b"data").unwrap();
            entries.push(ds.display().to_string());
        }

        let config = PackConfig {
            inputs: DatasetInputs {
                entries,
                ..Default::default()
            },
            output_dir: dir.join("out"),
            root,
            bounds: SizeBounds::new(1, 1024),
            ..Default::default()
        };
        PackCoordinator::new(config).run(None)
    }

    #[test]
    fn test_pack_rejects_datasets_under_different_parents() {
        let dir = tempdir().unwrap();

        let err = pack_two_parents(dir.path(), None).unwrap_err();
        assert!(matches!(err, ArchiverError::Config(ConfigError::RootMismatch { .. })));
        assert!(!dir.path().join("out/ds1_ds9_part1_2files.tar").exists());
    }

    #[test]
    fn test_pack_rejects_root_that_is_not_the_dataset_parent() {
        let dir = tempdir().unwrap();

        let err = pack_two_parents(dir.path(), Some(dir.path().join("data"))).unwrap_err();
        assert!(matches!(err, ArchiverError::Config(ConfigError::RootMismatch { .. })));

        let err = pack_two_parents(dir.path(), Some(dir.path().join("data/a/ds1"))).unwrap_err();
        assert!(matches!(err, ArchiverError::Config(ConfigError::RootMismatch { .. })));
    }
}
