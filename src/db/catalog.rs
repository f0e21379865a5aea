//! Scoped catalog connection
//!
//! A `Catalog` owns one SQLite connection for one logical unit of work (a
//! packing run, a deferred build, a record call). It is passed by reference
//! into the collector's archived-file filter and the catalog writer, and the
//! connection is released when the value is dropped, on every exit path.

use crate::collect::types::{to_slash_path, DatasetRoot};
use crate::db::schema;
use crate::error::{CollectError, DbError, DbResult};
use crate::report::RunReport;
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where a member is archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Generated archive identifier
    pub archive_id: i64,
    /// Archive name (container file stem)
    pub name: String,
}

/// Open catalog connection
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open an existing, initialized catalog
    ///
    /// Fails with `DbError::Unavailable` if the file is missing, cannot be
    /// opened, or lacks the catalog tables.
    pub fn open(path: &Path) -> DbResult<Self> {
        if !path.is_file() {
            return Err(DbError::Unavailable {
                path: path.to_path_buf(),
                reason: "no such file".into(),
            });
        }
        let conn = Connection::open(path).map_err(|e| DbError::Unavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::configure_connection(&conn)?;

        let missing = schema::missing_tables(&conn)?;
        if !missing.is_empty() {
            return Err(DbError::Unavailable {
                path: path.to_path_buf(),
                reason: format!("missing tables: {} (run `dsarchive init`)", missing.join(", ")),
            });
        }

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open or create a catalog file and make sure the schema exists
    pub fn create(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        schema::configure_connection(&conn)?;
        schema::create_catalog(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory catalog
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_catalog(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Path of the catalog file (None for in-memory catalogs)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Check whether a dataset file already points at an archive
    pub fn is_archived(&self, dataset_id: &str, relative_path: &str) -> DbResult<bool> {
        let hit = self
            .conn
            .prepare_cached(
                "SELECT 1 FROM member_associations
                 WHERE dataset_id = ?1 AND relative_path = ?2 AND archive_id > 0
                 LIMIT 1",
            )?
            .query_row(params![dataset_id, relative_path], |_| Ok(()))
            .optional()?;
        Ok(hit.is_some())
    }

    /// Find the archive holding a dataset file
    pub fn locate(&self, dataset_id: &str, relative_path: &str) -> DbResult<Option<ArchiveLocation>> {
        let location = self
            .conn
            .query_row(
                "SELECT a.id, a.name FROM member_associations m
                 JOIN archives a ON a.id = m.archive_id
                 WHERE m.dataset_id = ?1 AND m.relative_path = ?2 AND m.archive_id > 0",
                params![dataset_id, relative_path],
                |row| {
                    Ok(ArchiveLocation {
                        archive_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    /// Generated identifier of a named archive
    pub fn archive_id(&self, name: &str) -> DbResult<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM archives WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Check whether a dataset has been registered
    pub fn dataset_registered(&self, dataset_id: &str) -> DbResult<bool> {
        let hit = self
            .conn
            .prepare_cached("SELECT 1 FROM datasets WHERE dataset_id = ?1")?
            .query_row([dataset_id], |_| Ok(()))
            .optional()?;
        Ok(hit.is_some())
    }

    /// Resolve a login name to its catalog user id
    pub fn lookup_user(&self, logname: &str) -> DbResult<i64> {
        self.conn
            .query_row(
                "SELECT user_id FROM users WHERE logname = ?1 LIMIT 1",
                [logname],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::UnknownUser {
                logname: logname.to_string(),
            })
    }

    /// Insert or replace a user
    pub fn add_user(&self, logname: &str, user_id: i64) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO users (user_id, logname) VALUES (?1, ?2)
             ON CONFLICT(logname) DO UPDATE SET user_id = excluded.user_id",
            params![user_id, logname],
        )?;
        Ok(())
    }

    /// Register a dataset and its file inventory
    ///
    /// Inserts the dataset row and one association per regular file with no
    /// archive reference. Existing associations, including their archive
    /// references, are left untouched. Entries that cannot be walked are
    /// handed to the report and get no association. Returns the number of
    /// new associations.
    pub fn register_dataset(&mut self, dataset: &DatasetRoot, report: &mut RunReport) -> DbResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO datasets (dataset_id, root_path, registered_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(dataset_id) DO UPDATE SET root_path = excluded.root_path",
            params![
                dataset.id,
                dataset.path.display().to_string(),
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
            ],
        )?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO member_associations (dataset_id, relative_path, archive_id)
                 VALUES (?1, ?2, NULL)",
            )?;
            for entry in WalkDir::new(&dataset.path).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        report.file_unreadable(CollectError::WalkFailed {
                            path: e.path().unwrap_or(&dataset.path).to_path_buf(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                let relative = entry
                    .path()
                    .strip_prefix(&dataset.path)
                    .ok()
                    .and_then(to_slash_path);
                match relative {
                    Some(relative) => inserted += stmt.execute(params![dataset.id, relative])?,
                    None => report.file_unreadable(CollectError::StatFailed {
                        path: entry.path().to_path_buf(),
                        reason: "path is not valid UTF-8".into(),
                    }),
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Insert single association rows (tests and external inventory loaders)
    pub fn register_members<S: AsRef<str>>(&mut self, dataset_id: &str, relative_paths: &[S]) -> DbResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO datasets (dataset_id, root_path, registered_at) VALUES (?1, NULL, ?2)",
            params![dataset_id, Local::now().format("%Y-%m-%d %H:%M:%S").to_string()],
        )?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO member_associations (dataset_id, relative_path, archive_id)
                 VALUES (?1, ?2, NULL)",
            )?;
            for relative in relative_paths {
                inserted += stmt.execute(params![dataset_id, relative.as_ref()])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_rejects_missing_and_uninitialized() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.db");
        assert!(matches!(Catalog::open(&missing), Err(DbError::Unavailable { .. })));

        let empty = dir.path().join("empty.db");
        Connection::open(&empty).unwrap();
        assert!(matches!(Catalog::open(&empty), Err(DbError::Unavailable { .. })));

        Catalog::create(&empty).unwrap();
        assert!(Catalog::open(&empty).is_ok());
    }

    #[test]
    fn test_lookup_user() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.add_user("alice", 42).unwrap();
        catalog.add_user("alice", 43).unwrap();

        assert_eq!(catalog.lookup_user("alice").unwrap(), 43);
        assert!(matches!(
            catalog.lookup_user("bob"),
            Err(DbError::UnknownUser { .. })
        ));
    }

    #[test]
    fn test_register_dataset_walks_files() {
        let dir = tempdir().unwrap();
        let ds = dir.path().join("ds1");
        fs::create_dir_all(ds.join("sub")).unwrap();
        fs::write(ds.join("a.nc"), b"a").unwrap();
        fs::write(ds.join("sub").join("b.nc"), b"b").unwrap();

        let root = DatasetRoot::from_dir(&ds).unwrap();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let mut report = RunReport::new();

        assert_eq!(catalog.register_dataset(&root, &mut report).unwrap(), 2);
        assert_eq!(catalog.register_dataset(&root, &mut report).unwrap(), 0);
        assert_eq!(report.files_unreadable, 0);
        assert!(catalog.dataset_registered("ds1").unwrap());
        assert!(!catalog.dataset_registered("ds2").unwrap());
        assert!(!catalog.is_archived("ds1", "sub/b.nc").unwrap());
    }

    #[test]
    fn test_register_dataset_reports_walk_errors() {
        let dir = tempdir().unwrap();
        let root = DatasetRoot {
            id: "ds1".into(),
            path: dir.path().join("vanished"),
        };
        let mut catalog = Catalog::open_in_memory().unwrap();
        let mut report = RunReport::new();

        assert_eq!(catalog.register_dataset(&root, &mut report).unwrap(), 0);
        assert_eq!(report.files_unreadable, 1);
        assert!(catalog.dataset_registered("ds1").unwrap());
    }

    #[test]
    fn test_is_archived_requires_positive_reference() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.register_members("ds1", &["a.nc", "b.nc"]).unwrap();
        catalog
            .conn()
            .execute(
                "UPDATE member_associations SET archive_id = 0 WHERE relative_path = 'b.nc'",
                [],
            )
            .unwrap();
        catalog
            .conn()
            .execute(
                "UPDATE member_associations SET archive_id = 7 WHERE relative_path = 'a.nc'",
                [],
            )
            .unwrap();

        assert!(catalog.is_archived("ds1", "a.nc").unwrap());
        assert!(!catalog.is_archived("ds1", "b.nc").unwrap());
        assert!(!catalog.is_archived("ds1", "c.nc").unwrap());
    }

    #[test]
    fn test_locate() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.register_members("ds1", &["a.nc", "b.nc"]).unwrap();
        catalog
            .conn()
            .execute(
                "INSERT INTO archives (id, name, byte_size, member_count, created_at, modified_at,
                     format_tag, status, owner_id, dataset_id_list, member_manifest)
                 VALUES (5, 'ds1_part1_1files', 1, 1, 'now', 'now', 'tar', 'archived', 1, 'ds1', '')",
                [],
            )
            .unwrap();
        catalog
            .conn()
            .execute(
                "UPDATE member_associations SET archive_id = 5 WHERE relative_path = 'a.nc'",
                [],
            )
            .unwrap();

        let location = catalog.locate("ds1", "a.nc").unwrap().unwrap();
        assert_eq!(location.archive_id, 5);
        assert_eq!(location.name, "ds1_part1_1files");
        assert_eq!(catalog.archive_id("ds1_part1_1files").unwrap(), Some(5));
        assert!(catalog.locate("ds1", "b.nc").unwrap().is_none());
        assert!(catalog.locate("ds2", "a.nc").unwrap().is_none());
    }
}
