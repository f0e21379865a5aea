//! Batch types
//!
//! A Batch is an ordered group of collected files destined for one archive.
//! It has no persisted identity; its ordinal within the run is assigned when
//! the batcher emits it.

use crate::collect::FileDescriptor;
use std::collections::BTreeSet;

/// Default minimum aggregate batch size (1 TiB)
pub const DEFAULT_MIN_SIZE_BYTES: u64 = 1024 * 1024 * 1024 * 1024;

/// Default maximum aggregate batch size (3 TiB)
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 3 * 1024 * 1024 * 1024 * 1024;

/// Aggregate size bounds for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    /// A batch below this size is under-filled
    pub min: u64,
    /// No batch may be filled beyond this size
    pub max: u64,
}

impl SizeBounds {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Check whether a size lies within the bounds
    pub fn contains(&self, size: u64) -> bool {
        size >= self.min && size <= self.max
    }
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SIZE_BYTES, DEFAULT_MAX_SIZE_BYTES)
    }
}

/// Why a batch was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Reached at least the minimum size before the next file overflowed it
    Filled,
    /// Closed below the minimum because the next file would overflow it
    Forced,
    /// Closed at the end of the input
    EndOfInput,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Filled => write!(f, "filled"),
            CloseReason::Forced => write!(f, "forced"),
            CloseReason::EndOfInput => write!(f, "end-of-input"),
        }
    }
}

/// An ordered group of files destined for one archive
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based ordinal within the run (0 until emitted)
    pub index: usize,
    /// How the batch was closed
    pub close_reason: CloseReason,
    /// Whether a trailing under-filled batch was merged into this one
    pub merged_trailing: bool,
    members: Vec<FileDescriptor>,
    aggregate_size: u64,
}

impl Batch {
    /// Create a new empty batch
    pub fn new() -> Self {
        Self {
            index: 0,
            close_reason: CloseReason::EndOfInput,
            merged_trailing: false,
            members: Vec::new(),
            aggregate_size: 0,
        }
    }

    /// Add a file
    pub fn push(&mut self, file: FileDescriptor) {
        self.aggregate_size += file.size;
        self.members.push(file);
    }

    /// Append every member of another batch, keeping order
    pub fn absorb(&mut self, other: Batch) {
        self.aggregate_size += other.aggregate_size;
        self.members.extend(other.members);
        self.merged_trailing = true;
    }

    /// Sum of member sizes
    pub fn aggregate_size(&self) -> u64 {
        self.aggregate_size
    }

    /// Members in input order
    pub fn members(&self) -> &[FileDescriptor] {
        &self.members
    }

    /// Get the number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Distinct dataset identifiers, sorted
    pub fn dataset_ids(&self) -> BTreeSet<&str> {
        self.members.iter().map(|m| m.dataset_id.as_str()).collect()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(ds: &str, name: &str, size: u64) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from(format!("/data/{}/{}", ds, name)),
            dataset_id: ds.into(),
            relative_path: name.into(),
            size,
            mtime: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
        }
    }

    #[test]
    fn test_batch_accumulates_size() {
        let mut batch = Batch::new();
        batch.push(file("ds1", "a", 100));
        batch.push(file("ds1", "b", 200));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.aggregate_size(), 300);
        assert!(!batch.merged_trailing);
    }

    #[test]
    fn test_batch_absorb_and_dataset_ids() {
        let mut first = Batch::new();
        first.push(file("ds2", "a", 100));
        let mut second = Batch::new();
        second.push(file("ds1", "b", 50));
        second.push(file("ds2", "c", 25));

        first.absorb(second);

        assert_eq!(first.aggregate_size(), 175);
        assert!(first.merged_trailing);
        let names: Vec<_> = first.members().iter().map(|m| m.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(first.dataset_ids().into_iter().collect::<Vec<_>>(), vec!["ds1", "ds2"]);
    }

    #[test]
    fn test_size_bounds() {
        let bounds = SizeBounds::new(10, 30);
        assert!(bounds.contains(10));
        assert!(bounds.contains(30));
        assert!(!bounds.contains(9));
        assert!(!bounds.contains(31));
        assert_eq!(SizeBounds::default().max, 3 * SizeBounds::default().min);
    }
}
