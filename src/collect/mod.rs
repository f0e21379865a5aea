//! File collection
//!
//! Resolves dataset roots (from paths or a dataset list file) and walks them
//! into an ordered sequence of file descriptors, optionally dropping files
//! the catalog already records as archived.

pub mod collector;
pub mod datasets;
pub mod types;

pub use collector::FileCollector;
pub use datasets::{check_root, common_parent, read_dataset_list, resolve_roots};
pub use types::{DatasetRoot, EntryType, FileDescriptor, Permissions};
