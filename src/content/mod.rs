//! Content hashing for finished containers

pub mod checksum;

pub use checksum::{checksum_file, checksum_reader};
