//! Size-bounded batching
//!
//! Partitions the collected file sequence into batches whose aggregate size
//! falls between a configured minimum and maximum.

pub mod packer;
pub mod types;

pub use packer::Batcher;
pub use types::{Batch, CloseReason, SizeBounds, DEFAULT_MAX_SIZE_BYTES, DEFAULT_MIN_SIZE_BYTES};
