//! Catalog writer
//!
//! Records one archive in two passes:
//!
//! 1. Upsert the `archives` row keyed by name and read back its id, inside
//!    one transaction. Any failure rolls back and is returned as
//!    `DbError::Upsert`; nothing about the archive is committed.
//! 2. Point each member's association at that id. Best effort: members of an
//!    unregistered dataset are skipped and reported once per dataset, and a
//!    failed member update is reported without undoing the others.
//!
//! Re-recording the same archive converges on the same row (last write wins
//! on every non-key column) and the same associations.

use crate::db::catalog::Catalog;
use crate::db::record::ArchiveRecord;
use crate::error::{DbError, DbResult};
use crate::report::RunReport;
use rusqlite::params;
use std::collections::BTreeMap;
use tracing::info;

/// Upsert on the archive name
const UPSERT_ARCHIVE: &str = r#"
INSERT INTO archives (
    name, byte_size, member_count, created_at, modified_at, format_tag,
    checksum, status, owner_id, primary_dataset_id, dataset_id_list, member_manifest
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
ON CONFLICT(name) DO UPDATE SET
    byte_size = excluded.byte_size,
    member_count = excluded.member_count,
    created_at = excluded.created_at,
    modified_at = excluded.modified_at,
    format_tag = excluded.format_tag,
    checksum = excluded.checksum,
    status = excluded.status,
    owner_id = excluded.owner_id,
    primary_dataset_id = excluded.primary_dataset_id,
    dataset_id_list = excluded.dataset_id_list,
    member_manifest = excluded.member_manifest
"#;

/// Point one member at its archive
///
/// Members added to a registered dataset after its inventory was taken get
/// their association row here.
const UPSERT_ASSOCIATION: &str = r#"
INSERT INTO member_associations (dataset_id, relative_path, archive_id)
VALUES (?1, ?2, ?3)
ON CONFLICT(dataset_id, relative_path) DO UPDATE SET archive_id = excluded.archive_id
"#;

/// What happened to one archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Row upserted and associations updated
    Recorded {
        archive_id: i64,
        associations_updated: usize,
    },
    /// Row already existed and updates were disabled
    Skipped { archive_id: i64 },
}

impl RecordOutcome {
    pub fn archive_id(&self) -> i64 {
        match self {
            RecordOutcome::Recorded { archive_id, .. } | RecordOutcome::Skipped { archive_id } => {
                *archive_id
            }
        }
    }
}

/// Writes archive records into a catalog
pub struct CatalogWriter<'c> {
    catalog: &'c mut Catalog,
    update_existing: bool,
}

impl<'c> CatalogWriter<'c> {
    pub fn new(catalog: &'c mut Catalog) -> Self {
        Self {
            catalog,
            update_existing: true,
        }
    }

    /// Leave archives that already have a row completely untouched
    pub fn no_update(mut self) -> Self {
        self.update_existing = false;
        self
    }

    /// Record one archive
    pub fn record(&mut self, record: &ArchiveRecord, report: &mut RunReport) -> DbResult<RecordOutcome> {
        if !self.update_existing {
            if let Some(archive_id) = self.catalog.archive_id(&record.name)? {
                info!(archive = %record.name, archive_id, "Archive already recorded, not updating");
                return Ok(RecordOutcome::Skipped { archive_id });
            }
        }

        let archive_id = self.upsert_archive(record).map_err(|source| DbError::Upsert {
            name: record.name.clone(),
            source,
        })?;

        let associations_updated = self.update_associations(archive_id, record, report);
        report.archive_recorded(&record.name, archive_id, associations_updated);

        Ok(RecordOutcome::Recorded {
            archive_id,
            associations_updated,
        })
    }

    fn upsert_archive(&mut self, record: &ArchiveRecord) -> rusqlite::Result<i64> {
        let tx = self.catalog.conn_mut().transaction()?;
        tx.execute(
            UPSERT_ARCHIVE,
            params![
                record.name,
                record.byte_size as i64,
                record.member_count as i64,
                record.created_at,
                record.modified_at,
                record.format_tag,
                record.checksum,
                record.status,
                record.owner_id,
                record.primary_dataset_id,
                record.dataset_id_list,
                record.member_manifest(),
            ],
        )?;
        let archive_id: i64 =
            tx.query_row("SELECT id FROM archives WHERE name = ?1", [&record.name], |row| row.get(0))?;
        tx.commit()?;
        Ok(archive_id)
    }

    /// Returns the number of associations written
    fn update_associations(&mut self, archive_id: i64, record: &ArchiveRecord, report: &mut RunReport) -> usize {
        let mut by_dataset: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for member in &record.members {
            let relative = member.relative_path();
            if relative.is_empty() {
                report.member_without_dataset(&record.name, &member.name);
                continue;
            }
            by_dataset.entry(member.dataset_id()).or_default().push(relative);
        }

        let mut registered = Vec::with_capacity(by_dataset.len());
        for (dataset, members) in &by_dataset {
            match self.catalog.dataset_registered(dataset) {
                Ok(true) => registered.push((*dataset, members)),
                Ok(false) => report.dataset_unregistered(dataset, members.len()),
                Err(e) => report.catalog_failed(&format!("dataset lookup for '{}'", dataset), &e),
            }
        }
        if registered.is_empty() {
            return 0;
        }

        let tx = match self.catalog.conn_mut().transaction() {
            Ok(tx) => tx,
            Err(e) => {
                report.catalog_failed("association update", &e);
                return 0;
            }
        };

        let mut updated = 0;
        {
            let mut stmt = match tx.prepare_cached(UPSERT_ASSOCIATION) {
                Ok(stmt) => stmt,
                Err(e) => {
                    report.catalog_failed("association update", &e);
                    return 0;
                }
            };
            for (dataset, members) in registered {
                for relative in members {
                    match stmt.execute(params![dataset, relative, archive_id]) {
                        Ok(n) => updated += n,
                        Err(e) => report.catalog_failed(
                            &format!("association update for '{}/{}'", dataset, relative),
                            &e,
                        ),
                    }
                }
            }
        }

        if let Err(e) = tx.commit() {
            report.catalog_failed("association commit", &e);
            return 0;
        }
        updated
    }
}
