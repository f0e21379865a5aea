//! Archive containers and their side files
//!
//! - `builder`: batch → `.tar` container (immediate) or `.batch` manifest (deferred)
//! - `listing`: the `.mbr` member-listing dump written after each build
//! - `manifest`: deferred-build manifests
//! - `naming`: deterministic archive names and side-file paths

pub mod builder;
pub mod listing;
pub mod manifest;
pub mod naming;

pub use builder::{ArchiveBuilder, BuildOutcome, BuiltArchive};
pub use listing::{read_listing, write_listing, MemberEntry};
pub use naming::{archive_name, ArchivePaths};
