//! Dataset root resolution
//!
//! Dataset roots come from positional paths or from a list file with one
//! dataset identifier or directory per line. Blank lines and `#` comments
//! are ignored; entries that do not resolve to a directory are reported and
//! skipped.

use crate::collect::types::DatasetRoot;
use crate::error::{CollectError, ConfigError};
use crate::report::RunReport;
use std::fs;
use std::path::{Path, PathBuf};

/// Read the non-comment entries of a dataset list file
pub fn read_dataset_list(path: &Path) -> Result<Vec<String>, CollectError> {
    let content = fs::read_to_string(path).map_err(|e| CollectError::ListUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Resolve entries into dataset roots
///
/// Each entry is tried as a directory path first; if that fails and
/// `dataset_base` is given, as a dataset identifier under that base.
/// Duplicate roots are kept once, in first-seen order.
pub fn resolve_roots<S: AsRef<str>>(
    entries: &[S],
    dataset_base: Option<&Path>,
    report: &mut RunReport,
) -> Vec<DatasetRoot> {
    let mut roots: Vec<DatasetRoot> = Vec::new();

    for entry in entries {
        let entry = entry.as_ref();
        let resolved = DatasetRoot::from_dir(Path::new(entry))
            .or_else(|| dataset_base.and_then(|base| DatasetRoot::from_dir(&base.join(entry))));

        match resolved {
            Some(root) => {
                if roots.iter().any(|r| r.path == root.path) {
                    continue;
                }
                report.dataset_added(&root.id, &root.path);
                roots.push(root);
            }
            None => report.dataset_missing(entry),
        }
    }

    roots
}

/// Common parent directory of all dataset roots
///
/// Member names inside an archive are relative to this directory, so each
/// name starts with its dataset identifier.
pub fn common_parent(roots: &[DatasetRoot]) -> Option<PathBuf> {
    let mut parents = roots.iter().map(|r| r.path.parent().unwrap_or(&r.path));
    let first = parents.next()?.to_path_buf();

    Some(parents.fold(first, |common, p| {
        common
            .components()
            .zip(p.components())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.as_os_str())
            .collect()
    }))
}

/// Check that every dataset root sits directly under `root`
///
/// Member names are relative to `root` and the catalog takes a member's
/// dataset from the first name segment, so any other layout would attach
/// associations to the wrong dataset.
pub fn check_root(root: &Path, roots: &[DatasetRoot]) -> Result<(), ConfigError> {
    match roots.iter().find(|r| r.path.parent() != Some(root)) {
        Some(r) => Err(ConfigError::RootMismatch {
            dataset: r.id.clone(),
            path: r.path.clone(),
            root: root.to_path_buf(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_dataset_list_skips_comments() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("datasets.txt");
        fs::write(&list, "# header\n\nds084.1\n  ds083.2  \n#ds999.9\n").unwrap();

        let entries = read_dataset_list(&list).unwrap();
        assert_eq!(entries, vec!["ds084.1", "ds083.2"]);
    }

    #[test]
    fn test_read_dataset_list_missing_file() {
        let err = read_dataset_list(Path::new("/nonexistent/list.txt")).unwrap_err();
        assert!(matches!(err, CollectError::ListUnreadable { .. }));
    }

    #[test]
    fn test_resolve_roots_with_base_and_missing() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("ds1")).unwrap();
        fs::create_dir(dir.path().join("ds2")).unwrap();

        let direct = dir.path().join("ds1").display().to_string();
        let entries = vec![direct.clone(), "ds2".to_string(), "ds3".to_string(), direct];

        let mut report = RunReport::new();
        let roots = resolve_roots(&entries, Some(dir.path()), &mut report);

        let ids: Vec<_> = roots.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ds1", "ds2"]);
        assert_eq!(report.datasets, 2);
        assert_eq!(report.datasets_missing, 1);
    }

    #[test]
    fn test_common_parent() {
        let roots = vec![
            DatasetRoot { id: "ds1".into(), path: "/data/a/ds1".into() },
            DatasetRoot { id: "ds2".into(), path: "/data/a/ds2".into() },
        ];
        assert_eq!(common_parent(&roots), Some(PathBuf::from("/data/a")));

        let roots = vec![
            DatasetRoot { id: "ds1".into(), path: "/data/a/ds1".into() },
            DatasetRoot { id: "ds9".into(), path: "/data/b/ds9".into() },
        ];
        assert_eq!(common_parent(&roots), Some(PathBuf::from("/data")));

        assert_eq!(common_parent(&[]), None);
    }

    #[test]
    fn test_check_root() {
        let roots = vec![
            DatasetRoot { id: "ds1".into(), path: "/data/a/ds1".into() },
            DatasetRoot { id: "ds2".into(), path: "/data/a/ds2".into() },
        ];
        assert!(check_root(Path::new("/data/a"), &roots).is_ok());
        assert!(check_root(Path::new("/data"), &roots).is_err());
        assert!(check_root(Path::new("/data/a/ds1"), &roots[..1]).is_err());

        let roots = vec![
            DatasetRoot { id: "ds1".into(), path: "/data/a/ds1".into() },
            DatasetRoot { id: "ds9".into(), path: "/data/b/ds9".into() },
        ];
        let err = check_root(Path::new("/data"), &roots).unwrap_err();
        assert!(matches!(err, ConfigError::RootMismatch { ref dataset, .. } if dataset == "ds1"));
    }
}
