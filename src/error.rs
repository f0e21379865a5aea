//! Error types for dsarchive
//!
//! This module defines the error hierarchy for a packing run:
//! - Collection errors (dataset roots, stat failures)
//! - Archive errors (container, manifest and member-listing files)
//! - Catalog errors (SQLite)
//! - Configuration and CLI errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the path, dataset or archive name
//! - Recoverable conditions are classified here so callers can log and continue

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the dsarchive application
#[derive(Error, Debug)]
pub enum ArchiverError {
    /// File collection errors
    #[error("Collection error: {0}")]
    Collect(#[from] CollectError),

    /// Archive construction errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (output directory, log file, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No file under any dataset root could be archived
    #[error("No archivable files found under {roots} dataset root(s)")]
    NothingToArchive { roots: usize },

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Errors raised while resolving dataset roots and collecting files
#[derive(Error, Debug)]
pub enum CollectError {
    /// Dataset list file could not be read
    #[error("Failed to read dataset list '{path}': {reason}")]
    ListUnreadable { path: PathBuf, reason: String },

    /// Directory traversal failed for one entry
    #[error("Failed to walk '{path}': {reason}")]
    WalkFailed { path: PathBuf, reason: String },

    /// Stat failed for one file
    #[error("Failed to stat '{path}': {reason}")]
    StatFailed { path: PathBuf, reason: String },
}

/// Errors raised while building containers and their side files
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A member could not be opened or read before it was written
    #[error("Failed to add '{path}' to archive: {reason}")]
    MemberAdd { path: PathBuf, reason: String },

    /// A member lies outside the common root and has no archive-relative name
    #[error("'{path}' is not under archive root '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Writing or finalizing the container failed
    #[error("Failed to write archive '{path}': {reason}")]
    Commit { path: PathBuf, reason: String },

    /// Every member of the batch failed to be added
    #[error("Archive '{name}' has no members that could be added")]
    Empty { name: String },

    /// Manifest (deferred batch) file error
    #[error("Manifest error for '{path}': {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// Member-listing dump error
    #[error("Member listing error for '{path}': {reason}")]
    Listing { path: PathBuf, reason: String },

    /// Checksum computation failed
    #[error("Failed to checksum '{path}': {source}")]
    Checksum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Check if this error only affects a single member (the batch continues)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ArchiveError::MemberAdd { .. } | ArchiveError::OutsideRoot { .. }
        )
    }
}

/// Catalog errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Catalog could not be opened or is not initialized
    #[error("Catalog '{path}' is unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    /// Upsert transaction failed and was rolled back
    #[error("Failed to record archive '{name}': {source}")]
    Upsert {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    /// No login name could be determined for the current process
    #[error("Cannot determine login name (set LOGNAME or pass --logname)")]
    NoLogname,

    /// Owning user is not present in the users table
    #[error("User logname '{logname}' not found in catalog users table")]
    UnknownUser { logname: String },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Size string could not be parsed
    #[error("Invalid size '{value}': expected a number with optional KB/MB/GB/TB suffix")]
    InvalidSize { value: String },

    /// Size bounds are inconsistent
    #[error("Invalid size range: min {min} bytes must be <= max {max} bytes and max must be > 0")]
    InvalidSizeRange { min: u64, max: u64 },

    /// Neither dataset paths nor an input file were given
    #[error("Must provide either --input-file or dataset paths")]
    NoInputs,

    /// A catalog-backed option was requested without a catalog
    #[error("'{option}' requires a catalog (--catalog or DSARCHIVE_CATALOG)")]
    MissingCatalog { option: &'static str },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Input file error
    #[error("Invalid input file '{path}': {reason}")]
    InvalidInputFile { path: PathBuf, reason: String },

    /// A dataset root is not directly under the archive root, so its member
    /// names would not start with the dataset identifier
    #[error("Dataset '{dataset}' at '{path}' is not directly under archive root '{root}'")]
    RootMismatch {
        dataset: String,
        path: PathBuf,
        root: PathBuf,
    },

    /// Member reference for lookup is not `<dataset>/<path>`
    #[error("Invalid member '{member}': expected <dataset>/<relative path>")]
    InvalidMember { member: String },
}

/// Result type alias for ArchiverError
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for ArchiveError
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_recoverable() {
        let vanished = ArchiveError::MemberAdd {
            path: "/data/ds1/a.nc".into(),
            reason: "No such file or directory".into(),
        };
        assert!(vanished.is_recoverable());

        let disk_full = ArchiveError::Commit {
            path: "/out/ds1_part1_3files.tar".into(),
            reason: "No space left on device".into(),
        };
        assert!(!disk_full.is_recoverable());
    }

    #[test]
    fn test_collect_error_message() {
        let err = CollectError::StatFailed {
            path: "/data/ds1/a.nc".into(),
            reason: "permission denied".into(),
        };
        assert_eq!(err.to_string(), "Failed to stat '/data/ds1/a.nc': permission denied");
    }

    #[test]
    fn test_error_conversion() {
        let db_err = DbError::UnknownUser {
            logname: "nobody".into(),
        };
        let err: ArchiverError = db_err.into();
        assert!(matches!(err, ArchiverError::Catalog(_)));
        assert!(err.to_string().contains("nobody"));
    }
}
