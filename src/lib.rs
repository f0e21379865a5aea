//! dsarchive - dataset archiver
//!
//! Packs the files of one or more datasets into tar containers whose
//! aggregate size falls within configured bounds, and records every archive
//! and the archive each file went into in a SQLite catalog, so that later
//! runs skip what is already archived and `locate` can answer "which
//! archive holds file X".
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  FileCollector   │──►│     Batcher      │──►│  ArchiveBuilder  │
//! │  walkdir, skip   │   │  greedy, single  │   │  .tar + .mbr     │
//! │  archived files  │   │  pass, min..max  │   │  or .batch       │
//! └────────┬─────────┘   └──────────────────┘   └────────┬─────────┘
//!          │ is_archived                                 │ listing
//!          ▼                                             ▼
//! ┌──────────────────┐                         ┌──────────────────┐
//! │     Catalog      │◄────────────────────────│  CatalogWriter   │
//! │  (SQLite file)   │   upsert + associations │  + SHA-256       │
//! └──────────────────┘                         └──────────────────┘
//! ```
//!
//! Every step is idempotent at archive granularity: a batch whose member
//! listing exists is not rebuilt, and catalog rows are keyed by archive name.
//!
//! # Example
//!
//! ```bash
//! dsarchive --catalog cat.db init
//! dsarchive --catalog cat.db add-user "$LOGNAME" 1001
//! dsarchive --catalog cat.db register /data/ds084.1
//! dsarchive --catalog cat.db pack /data/ds084.1 -o /archive --check-archived
//! dsarchive --catalog cat.db locate ds084.1/2020/file.grb
//! ```

pub mod archive;
pub mod batch;
pub mod collect;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod progress;
pub mod report;

pub use config::{CliArgs, PackConfig};
pub use coordinator::{PackCoordinator, RunResult};
pub use error::{ArchiverError, Result};
pub use report::RunReport;
