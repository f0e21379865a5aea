//! File and dataset types produced by collection
//!
//! A `FileDescriptor` is immutable once collected. It carries everything the
//! batcher, the archive builder and the catalog need, so none of them has to
//! stat the file again before it is opened for archiving.

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Type of filesystem entry, as shown in the first column of a member listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Anything else (devices, pipes, sockets)
    Other,
}

impl EntryType {
    /// Convert from mode bits
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o100000 => EntryType::File,      // S_IFREG
            0o040000 => EntryType::Directory, // S_IFDIR
            0o120000 => EntryType::Symlink,   // S_IFLNK
            _ => EntryType::Other,
        }
    }

    /// Convert from a listing type character
    pub fn from_char(c: char) -> Self {
        match c {
            '-' => EntryType::File,
            'd' => EntryType::Directory,
            'l' => EntryType::Symlink,
            _ => EntryType::Other,
        }
    }

    /// Listing type character (`ls -l` / `tar -tv` convention)
    pub fn as_char(&self) -> char {
        match self {
            EntryType::File => '-',
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
            EntryType::Other => '?',
        }
    }

    /// Tar typeflag digit recorded in the catalog manifest
    pub fn as_tar_type(&self) -> u8 {
        match self {
            EntryType::File => 0,
            EntryType::Symlink => 2,
            EntryType::Directory => 5,
            EntryType::Other => 9,
        }
    }

    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == EntryType::File
    }
}

/// File permissions (Unix mode bits without type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(pub u32);

impl Permissions {
    /// Create from full mode (strips type bits)
    pub fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Get the raw permission bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Render as the nine-character `rwxr-xr-x` form
    pub fn to_rwx_string(&self) -> String {
        let m = self.0;
        let mut s = String::with_capacity(9);
        for (shift, special, set_char) in [(6, 0o4000, 's'), (3, 0o2000, 's'), (0, 0o1000, 't')] {
            let bits = (m >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            let exec = bits & 0o1 != 0;
            s.push(match (m & special != 0, exec) {
                (true, true) => set_char,
                (true, false) => set_char.to_ascii_uppercase(),
                (false, true) => 'x',
                (false, false) => '-',
            });
        }
        s
    }

    /// Parse the nine-character `rwxr-xr-x` form
    pub fn parse_rwx(s: &str) -> Option<Self> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 9 {
            return None;
        }
        let mut mode = 0u32;
        for (group, special) in [(0usize, 0o4000u32), (1, 0o2000), (2, 0o1000)] {
            let shift = 6 - 3 * group as u32;
            let c = &chars[group * 3..group * 3 + 3];
            match c[0] {
                'r' => mode |= 0o4 << shift,
                '-' => {}
                _ => return None,
            }
            match c[1] {
                'w' => mode |= 0o2 << shift,
                '-' => {}
                _ => return None,
            }
            match c[2] {
                'x' => mode |= 0o1 << shift,
                's' | 't' => mode |= (0o1 << shift) | special,
                'S' | 'T' => mode |= special,
                '-' => {}
                _ => return None,
            }
        }
        Some(Self(mode))
    }
}

/// A dataset: a named top-level directory tree that files are rooted under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRoot {
    /// Dataset identifier (the directory's base name)
    pub id: String,
    /// Absolute path of the dataset directory
    pub path: PathBuf,
}

impl DatasetRoot {
    /// Resolve a directory into a dataset root
    ///
    /// Returns `None` if the path is not an existing directory or has no
    /// usable base name.
    pub fn from_dir(path: &Path) -> Option<Self> {
        if !path.is_dir() {
            return None;
        }
        let path = path.canonicalize().ok()?;
        let id = path.file_name()?.to_str()?.to_string();
        Some(Self { id, path })
    }
}

/// One collected file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute host path
    pub path: PathBuf,
    /// Owning dataset identifier
    pub dataset_id: String,
    /// Path relative to the dataset root, `/`-separated
    pub relative_path: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time (Unix timestamp)
    pub mtime: i64,
    /// Full mode (type + permissions)
    pub mode: u32,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
}

impl FileDescriptor {
    /// Build a descriptor from already-fetched metadata
    pub fn from_metadata(path: &Path, dataset: &DatasetRoot, metadata: &Metadata) -> Option<Self> {
        let relative = path.strip_prefix(&dataset.path).ok()?;
        let relative_path = to_slash_path(relative)?;
        let (mode, uid, gid) = unix_fields(metadata);
        Some(Self {
            path: path.to_path_buf(),
            dataset_id: dataset.id.clone(),
            relative_path,
            size: metadata.len(),
            mtime: mtime_from(metadata),
            mode,
            uid,
            gid,
        })
    }

    /// Entry type derived from the mode bits
    pub fn entry_type(&self) -> EntryType {
        EntryType::from_mode(self.mode)
    }

    /// Permission bits
    pub fn permissions(&self) -> Permissions {
        Permissions::from_mode(self.mode)
    }
}

/// Join the normal components of a relative path with `/`
///
/// Returns `None` for paths that escape upward or are not valid UTF-8, since
/// those cannot be stored as catalog keys.
pub fn to_slash_path(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

pub(crate) fn mtime_from(md: &Metadata) -> i64 {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
pub(crate) fn unix_fields(md: &Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (md.mode(), md.uid(), md.gid())
}

#[cfg(not(unix))]
pub(crate) fn unix_fields(md: &Metadata) -> (u32, u32, u32) {
    let mode = if md.is_dir() { 0o040755 } else { 0o100644 };
    (mode, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_from_mode() {
        assert_eq!(EntryType::from_mode(0o100644), EntryType::File);
        assert_eq!(EntryType::from_mode(0o040755), EntryType::Directory);
        assert_eq!(EntryType::from_mode(0o120777), EntryType::Symlink);
        assert_eq!(EntryType::from_mode(0o060660), EntryType::Other);
        assert_eq!(EntryType::from_char('-'), EntryType::File);
        assert_eq!(EntryType::File.as_char(), '-');
    }

    #[test]
    fn test_permissions_rwx() {
        assert_eq!(Permissions::from_mode(0o100644).to_rwx_string(), "rw-r--r--");
        assert_eq!(Permissions::from_mode(0o755).to_rwx_string(), "rwxr-xr-x");
        assert_eq!(Permissions::from_mode(0o4755).to_rwx_string(), "rwsr-xr-x");
        assert_eq!(Permissions::from_mode(0o1644).to_rwx_string(), "rw-r--r-T");

        assert_eq!(Permissions::parse_rwx("rw-r--r--"), Some(Permissions(0o644)));
        assert_eq!(Permissions::parse_rwx("rwsr-xr-x"), Some(Permissions(0o4755)));
        assert_eq!(Permissions::parse_rwx("rw-r--r-T"), Some(Permissions(0o1644)));
        assert_eq!(Permissions::parse_rwx("rw-"), None);
        assert_eq!(Permissions::parse_rwx("rw-r--r-q"), None);
    }

    #[test]
    fn test_to_slash_path() {
        assert_eq!(
            to_slash_path(Path::new("sub/dir/file.nc")),
            Some("sub/dir/file.nc".to_string())
        );
        assert_eq!(to_slash_path(Path::new("./file.nc")), Some("file.nc".to_string()));
        assert_eq!(to_slash_path(Path::new("../escape")), None);
        assert_eq!(to_slash_path(Path::new("")), None);
    }

    #[test]
    fn test_dataset_root_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dir.path().join("ds084.1");
        std::fs::create_dir(&ds).unwrap();

        let root = DatasetRoot::from_dir(&ds).unwrap();
        assert_eq!(root.id, "ds084.1");
        assert!(root.path.is_absolute());

        assert!(DatasetRoot::from_dir(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_descriptor_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dir.path().join("ds1");
        std::fs::create_dir_all(ds.join("2020")).unwrap();
        let file = ds.join("2020").join("a.grb");
        std::fs::write(&file, b"abcdef").unwrap();

        let root = DatasetRoot::from_dir(&ds).unwrap();
        let path = root.path.join("2020").join("a.grb");
        let md = std::fs::metadata(&path).unwrap();
        let desc = FileDescriptor::from_metadata(&path, &root, &md).unwrap();

        assert_eq!(desc.dataset_id, "ds1");
        assert_eq!(desc.relative_path, "2020/a.grb");
        assert_eq!(desc.size, 6);
        assert!(desc.entry_type().is_file());
    }
}
