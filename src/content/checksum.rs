//! Container checksums using SHA-256
//!
//! The finished container is streamed through the hasher in fixed-size
//! chunks, so memory use does not depend on archive size. The digest covers
//! container bytes, so it changes if member order changes even when the
//! members themselves do not.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read chunk size
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the SHA-256 checksum of everything a reader yields
///
/// Returns a lowercase hex string (64 characters).
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 checksum of a file
///
/// # Example
///
/// ```no_run
/// use dsarchive::content::checksum::checksum_file;
/// use std::path::Path;
///
/// let sum = checksum_file(Path::new("ds084.1_part1_42files.tar")).unwrap();
/// assert_eq!(sum.len(), 64);
/// ```
pub fn checksum_file(path: &Path) -> io::Result<String> {
    checksum_reader(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_checksum_known_value() {
        let hash = checksum_reader(Cursor::new(b"abc")).unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_content() {
        let hash = checksum_reader(Cursor::new(b"")).unwrap();
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_checksum_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        // Spans several chunks
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let first = checksum_file(&path).unwrap();
        let second = checksum_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, checksum_reader(Cursor::new(&data)).unwrap());
    }

    #[test]
    fn test_checksum_missing_file() {
        assert!(checksum_file(Path::new("/nonexistent/archive.tar")).is_err());
    }
}
