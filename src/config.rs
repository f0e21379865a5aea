//! Configuration types for dsarchive
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Validated runtime configuration for each subcommand
//! - Human-readable size parsing

use crate::batch::{SizeBounds, DEFAULT_MAX_SIZE_BYTES, DEFAULT_MIN_SIZE_BYTES};
use crate::collect::read_dataset_list;
use crate::error::{CollectError, ConfigError};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Environment variable naming the catalog file
pub const CATALOG_ENV: &str = "DSARCHIVE_CATALOG";

/// Pack dataset files into size-bounded tar archives and catalog them
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dsarchive",
    version,
    about = "Pack dataset files into size-bounded tar archives and catalog them",
    long_about = "Collects files from dataset directories, packs them into tar archives whose \
                  aggregate size falls between --min-size and --max-size, writes a member \
                  listing (.mbr) next to every archive and records archives and member \
                  associations in a SQLite catalog.\n\n\
                  Re-running over the same inputs is safe: archives whose listing exists are \
                  not rebuilt, and catalog rows are upserted by archive name.",
    after_help = "EXAMPLES:\n    \
        dsarchive --catalog cat.db init\n    \
        dsarchive --catalog cat.db register /data/ds084.1 /data/ds083.2\n    \
        dsarchive --catalog cat.db pack /data/ds084.1 -o /archive --check-archived\n    \
        dsarchive pack -i datasets.txt --dataset-base /data -o /queue --deferred\n    \
        dsarchive --catalog cat.db build /queue/*.batch --root /data -o /archive\n    \
        dsarchive --catalog cat.db record /archive/ds084.1_part1_120files.mbr\n    \
        dsarchive --catalog cat.db locate ds084.1/2020/file.grb"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Catalog database file
    #[arg(long, global = true, env = CATALOG_ENV, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Dataset selection shared by `pack` and `register`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// Dataset directories (or identifiers, with --dataset-base)
    #[arg(value_name = "DATASET")]
    pub datasets: Vec<String>,

    /// File listing one dataset directory or identifier per line
    #[arg(short = 'i', long, value_name = "FILE", conflicts_with = "datasets")]
    pub input_file: Option<PathBuf>,

    /// Directory that bare dataset identifiers are resolved under
    #[arg(long, value_name = "DIR")]
    pub dataset_base: Option<PathBuf>,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the catalog schema
    Init,

    /// Add or replace a catalog user
    AddUser {
        /// Login name
        #[arg(value_name = "LOGNAME")]
        logname: String,

        /// Numeric user id stored as archive owner
        #[arg(value_name = "ID")]
        user_id: i64,
    },

    /// Register dataset file inventories in the catalog
    Register {
        #[command(flatten)]
        datasets: DatasetArgs,
    },

    /// Collect, batch and archive dataset files
    Pack {
        #[command(flatten)]
        datasets: DatasetArgs,

        /// Output directory for archives, listings and manifests
        #[arg(short, long, default_value = ".", value_name = "DIR")]
        output: PathBuf,

        /// Root that member names are made relative to
        /// (default: common parent of the datasets)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Minimum aggregate archive size (e.g. 500GB, 1TB)
        #[arg(long, default_value = "1TB", value_name = "SIZE")]
        min_size: String,

        /// Maximum aggregate archive size
        #[arg(long, default_value = "3TB", value_name = "SIZE")]
        max_size: String,

        /// Write .batch manifests instead of building archives
        #[arg(long)]
        deferred: bool,

        /// Skip files the catalog already associates with an archive
        #[arg(long)]
        check_archived: bool,

        /// Do not record built archives in the catalog
        #[arg(long)]
        no_record: bool,

        /// Owner login name (default: $LOGNAME or $USER)
        #[arg(long, value_name = "NAME")]
        logname: Option<String>,
    },

    /// Build archives from .batch manifests
    Build {
        /// Manifest files
        #[arg(value_name = "MANIFEST", required = true)]
        manifests: Vec<PathBuf>,

        /// Root that manifest paths are relative to
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Output directory (default: next to each manifest)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Do not record built archives in the catalog
        #[arg(long)]
        no_record: bool,

        /// Owner login name (default: $LOGNAME or $USER)
        #[arg(long, value_name = "NAME")]
        logname: Option<String>,
    },

    /// Record archives in the catalog from their .mbr listings
    Record {
        /// Member listing files
        #[arg(value_name = "LISTING", required = true)]
        listings: Vec<PathBuf>,

        /// Leave archives that are already recorded untouched
        #[arg(long)]
        no_update: bool,

        /// Owner login name (default: $LOGNAME or $USER)
        #[arg(long, value_name = "NAME")]
        logname: Option<String>,
    },

    /// Show which archive holds a file
    Locate {
        /// `<dataset>/<relative path>`
        #[arg(value_name = "MEMBER")]
        member: String,
    },
}

/// Parse a size with an optional binary suffix
///
/// Accepts `B`, `KB`, `MB`, `GB`, `TB` (powers of 1024) and the `KiB`..`TiB`
/// spellings. Fractions are allowed: `1.5TB`.
pub fn parse_size(s: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidSize {
        value: s.to_string(),
    };
    let upper = s.trim().to_uppercase();
    let upper = upper.replace("IB", "B");

    let (num_str, multiplier) = if let Some(n) = upper.strip_suffix("TB") {
        (n, 1024u64 * 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024u64 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024u64 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024u64)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1u64)
    } else {
        // Assume bytes if no suffix
        (upper.as_str(), 1u64)
    };

    let num: f64 = num_str.trim().parse().map_err(|_| invalid())?;
    if !num.is_finite() || num < 0.0 {
        return Err(invalid());
    }

    Ok((num * multiplier as f64) as u64)
}

/// Resolved dataset inputs
#[derive(Debug, Clone, Default)]
pub struct DatasetInputs {
    /// Entries given on the command line
    pub entries: Vec<String>,
    /// Dataset list file
    pub input_file: Option<PathBuf>,
    /// Directory bare identifiers are resolved under
    pub dataset_base: Option<PathBuf>,
}

impl DatasetInputs {
    fn from_args(args: DatasetArgs) -> Result<Self, ConfigError> {
        if args.datasets.is_empty() && args.input_file.is_none() {
            return Err(ConfigError::NoInputs);
        }
        if let Some(ref file) = args.input_file {
            if !file.is_file() {
                return Err(ConfigError::InvalidInputFile {
                    path: file.clone(),
                    reason: "File does not exist".to_string(),
                });
            }
        }
        Ok(Self {
            entries: args.datasets,
            input_file: args.input_file,
            dataset_base: args.dataset_base,
        })
    }

    /// Dataset entries, read from the list file when one was given
    pub fn load(&self) -> Result<Vec<String>, CollectError> {
        match self.input_file {
            Some(ref file) => read_dataset_list(file),
            None => Ok(self.entries.clone()),
        }
    }
}

/// Validated `pack` configuration
#[derive(Debug, Clone)]
pub struct PackConfig {
    pub inputs: DatasetInputs,

    /// Archive output directory
    pub output_dir: PathBuf,

    /// Common root for member names
    pub root: Option<PathBuf>,

    /// Batch size bounds
    pub bounds: SizeBounds,

    /// Write manifests only
    pub deferred: bool,

    /// Catalog database file
    pub catalog_path: Option<PathBuf>,

    /// Filter out already-archived files
    pub check_archived: bool,

    /// Record built archives in the catalog
    pub record: bool,

    /// Owner login name override
    pub logname: Option<String>,

    /// Show progress indicator
    pub show_progress: bool,
}

impl PackConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// Returns `None` if the command is not `pack`.
    pub fn from_args(args: &CliArgs) -> Option<Result<Self, ConfigError>> {
        let Command::Pack {
            datasets,
            output,
            root,
            min_size,
            max_size,
            deferred,
            check_archived,
            no_record,
            logname,
        } = &args.command
        else {
            return None;
        };

        Some((|| -> Result<Self, ConfigError> {
            let inputs = DatasetInputs::from_args(datasets.clone())?;

            let min = parse_size(min_size)?;
            let max = parse_size(max_size)?;
            if max == 0 || min > max {
                return Err(ConfigError::InvalidSizeRange { min, max });
            }

            validate_output_dir(output)?;

            if *check_archived && args.catalog.is_none() {
                return Err(ConfigError::MissingCatalog {
                    option: "--check-archived",
                });
            }

            Ok(Self {
                inputs,
                output_dir: output.clone(),
                root: root.clone(),
                bounds: SizeBounds::new(min, max),
                deferred: *deferred,
                catalog_path: args.catalog.clone(),
                check_archived: *check_archived,
                record: args.catalog.is_some() && !*no_record && !*deferred,
                logname: logname.clone(),
                show_progress: !args.quiet,
            })
        })())
    }
}

/// Validated `build` configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Manifests to build, in order
    pub manifests: Vec<PathBuf>,

    /// Root manifest paths are relative to
    pub root: PathBuf,

    /// Output directory (None: next to each manifest)
    pub output_dir: Option<PathBuf>,

    /// Catalog database file
    pub catalog_path: Option<PathBuf>,

    /// Record built archives in the catalog
    pub record: bool,

    /// Owner login name override
    pub logname: Option<String>,
}

impl BuildConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// Returns `None` if the command is not `build`.
    pub fn from_args(args: &CliArgs) -> Option<Result<Self, ConfigError>> {
        let Command::Build {
            manifests,
            root,
            output,
            no_record,
            logname,
        } = &args.command
        else {
            return None;
        };

        Some((|| -> Result<Self, ConfigError> {
            if !root.is_dir() {
                return Err(ConfigError::InvalidInputFile {
                    path: root.clone(),
                    reason: "Root is not a directory".to_string(),
                });
            }
            if let Some(dir) = output {
                validate_output_dir(dir)?;
            }

            Ok(Self {
                manifests: manifests.clone(),
                root: root.clone(),
                output_dir: output.clone(),
                catalog_path: args.catalog.clone(),
                record: args.catalog.is_some() && !*no_record,
                logname: logname.clone(),
            })
        })())
    }
}

/// Validated `record` configuration
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Member listings to record
    pub listings: Vec<PathBuf>,

    /// Catalog database file
    pub catalog_path: PathBuf,

    /// Update archives that are already recorded
    pub update_existing: bool,

    /// Owner login name override
    pub logname: Option<String>,
}

impl RecordConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// Returns `None` if the command is not `record`.
    pub fn from_args(args: &CliArgs) -> Option<Result<Self, ConfigError>> {
        let Command::Record {
            listings,
            no_update,
            logname,
        } = &args.command
        else {
            return None;
        };

        Some(require_catalog(args, "record").map(|catalog_path| Self {
            listings: listings.clone(),
            catalog_path,
            update_existing: !*no_update,
            logname: logname.clone(),
        }))
    }
}

/// Validated `register` configuration
#[derive(Debug, Clone)]
pub struct RegisterConfig {
    pub inputs: DatasetInputs,
    pub catalog_path: PathBuf,
}

impl RegisterConfig {
    /// Returns `None` if the command is not `register`.
    pub fn from_args(args: &CliArgs) -> Option<Result<Self, ConfigError>> {
        let Command::Register { datasets } = &args.command else {
            return None;
        };

        Some((|| -> Result<Self, ConfigError> {
            Ok(Self {
                inputs: DatasetInputs::from_args(datasets.clone())?,
                catalog_path: require_catalog(args, "register")?,
            })
        })())
    }
}

/// The catalog path, or an error naming the option that needs it
pub fn require_catalog(args: &CliArgs, option: &'static str) -> Result<PathBuf, ConfigError> {
    args.catalog
        .clone()
        .ok_or(ConfigError::MissingCatalog { option })
}

/// Split `<dataset>/<relative path>` for catalog lookups
pub fn split_member(member: &str) -> Result<(&str, &str), ConfigError> {
    match member.trim_start_matches('/').split_once('/') {
        Some((dataset, relative)) if !dataset.is_empty() && !relative.is_empty() => {
            Ok((dataset, relative))
        }
        _ => Err(ConfigError::InvalidMember {
            member: member.to_string(),
        }),
    }
}

fn validate_output_dir(dir: &Path) -> Result<(), ConfigError> {
    if dir.exists() && !dir.is_dir() {
        return Err(ConfigError::InvalidOutputPath {
            path: dir.to_path_buf(),
            reason: "Not a directory".to_string(),
        });
    }
    Ok(())
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            inputs: DatasetInputs::default(),
            output_dir: PathBuf::from("."),
            root: None,
            bounds: SizeBounds::new(DEFAULT_MIN_SIZE_BYTES, DEFAULT_MAX_SIZE_BYTES),
            deferred: false,
            catalog_path: None,
            check_archived: false,
            record: false,
            logname: None,
            show_progress: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIB: u64 = 1024 * 1024 * 1024 * 1024;

    fn parse(args: &[&str]) -> CliArgs {
        let mut argv = vec!["dsarchive"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    /// Drop a catalog picked up from DSARCHIVE_CATALOG
    fn without_catalog(mut args: CliArgs) -> CliArgs {
        args.catalog = None;
        args
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1TB").unwrap(), TIB);
        assert_eq!(parse_size("3tb").unwrap(), 3 * TIB);
        assert_eq!(parse_size("1.5TiB").unwrap(), TIB + TIB / 2);
        assert_eq!(parse_size("500GB").unwrap(), 500 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_size("2MiB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size(" 4096 ").unwrap(), 4096);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("TB").is_err());
        assert!(parse_size("-1GB").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_pack_defaults() {
        let args = without_catalog(parse(&["pack", "/tmp"]));
        let config = PackConfig::from_args(&args).unwrap().unwrap();

        assert_eq!(config.bounds, SizeBounds::default());
        assert_eq!(config.inputs.entries, vec!["/tmp"]);
        assert!(!config.record);
        assert!(!config.deferred);
    }

    #[test]
    fn test_pack_requires_inputs() {
        let args = parse(&["pack"]);
        let err = PackConfig::from_args(&args).unwrap().unwrap_err();
        assert!(matches!(err, ConfigError::NoInputs));
    }

    #[test]
    fn test_pack_rejects_inverted_sizes() {
        let args = parse(&["pack", "/tmp", "--min-size", "2TB", "--max-size", "1TB"]);
        let err = PackConfig::from_args(&args).unwrap().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSizeRange { .. }));
    }

    #[test]
    fn test_check_archived_needs_catalog() {
        let args = without_catalog(parse(&["pack", "/tmp", "--check-archived"]));
        let err = PackConfig::from_args(&args).unwrap().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCatalog { .. }));
    }

    #[test]
    fn test_record_enabled_by_catalog() {
        let args = parse(&["--catalog", "cat.db", "pack", "/tmp"]);
        assert!(PackConfig::from_args(&args).unwrap().unwrap().record);

        let args = parse(&["--catalog", "cat.db", "pack", "/tmp", "--no-record"]);
        assert!(!PackConfig::from_args(&args).unwrap().unwrap().record);

        let args = parse(&["--catalog", "cat.db", "pack", "/tmp", "--deferred"]);
        assert!(!PackConfig::from_args(&args).unwrap().unwrap().record);
    }

    #[test]
    fn test_from_args_wrong_command() {
        let args = parse(&["--catalog", "cat.db", "init"]);
        assert!(PackConfig::from_args(&args).is_none());
        assert!(BuildConfig::from_args(&args).is_none());
        assert!(RecordConfig::from_args(&args).is_none());
    }

    #[test]
    fn test_record_config() {
        let args = parse(&["--catalog", "cat.db", "record", "a.mbr", "b.mbr", "--no-update"]);
        let config = RecordConfig::from_args(&args).unwrap().unwrap();
        assert_eq!(config.listings.len(), 2);
        assert!(!config.update_existing);
        assert_eq!(config.catalog_path, PathBuf::from("cat.db"));
    }

    #[test]
    fn test_split_member() {
        assert_eq!(split_member("ds1/a/b.nc").unwrap(), ("ds1", "a/b.nc"));
        assert_eq!(split_member("/ds1/a.nc").unwrap(), ("ds1", "a.nc"));
        assert!(split_member("ds1").is_err());
        assert!(split_member("ds1/").is_err());
    }
}
