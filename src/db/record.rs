//! Archive catalog records
//!
//! An `ArchiveRecord` is everything the catalog stores about one archive. It
//! is built from the member list (fresh from a build, or read back from a
//! `.mbr` dump) so that a record can always be reconstructed without
//! reopening the container.

use crate::archive::listing::MemberEntry;
use crate::archive::naming::CONTAINER_SUFFIX;
use chrono::Local;
use std::collections::BTreeSet;

/// Status stored for every committed archive
pub const STATUS_ARCHIVED: &str = "archived";

/// Catalog row for one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// Unique archive name (idempotency key)
    pub name: String,
    /// Sum of member sizes
    pub byte_size: u64,
    pub member_count: usize,
    /// RFC 3339 timestamp
    pub created_at: String,
    /// RFC 3339 timestamp
    pub modified_at: String,
    /// Container format
    pub format_tag: String,
    /// Hex SHA-256 of the container, if it was available
    pub checksum: Option<String>,
    pub status: String,
    /// Owning user id from the `users` table
    pub owner_id: i64,
    /// Dataset of the first member
    pub primary_dataset_id: Option<String>,
    /// Sorted distinct dataset ids, comma separated
    pub dataset_id_list: String,
    /// Members in container order
    pub members: Vec<MemberEntry>,
}

impl ArchiveRecord {
    /// Build a record from an archive's members
    pub fn from_members(
        name: &str,
        members: Vec<MemberEntry>,
        checksum: Option<String>,
        owner_id: i64,
    ) -> Self {
        let now = Local::now().to_rfc3339();
        let datasets: BTreeSet<&str> = members.iter().map(|m| m.dataset_id()).collect();

        Self {
            name: name.to_string(),
            byte_size: members.iter().map(|m| m.size).sum(),
            member_count: members.len(),
            created_at: now.clone(),
            modified_at: now,
            format_tag: CONTAINER_SUFFIX.to_string(),
            checksum,
            status: STATUS_ARCHIVED.to_string(),
            owner_id,
            primary_dataset_id: members.first().map(|m| m.dataset_id().to_string()),
            dataset_id_list: datasets.into_iter().collect::<Vec<_>>().join(","),
            members,
        }
    }

    /// Newline-delimited member manifest text
    pub fn member_manifest(&self) -> String {
        self.members
            .iter()
            .map(MemberEntry::manifest_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::types::{EntryType, Permissions};

    fn member(name: &str, size: u64) -> MemberEntry {
        MemberEntry {
            entry_type: EntryType::File,
            permissions: Permissions(0o644),
            owner: "1000".into(),
            group: "100".into(),
            size,
            mtime: 1_700_000_000,
            name: name.into(),
        }
    }

    #[test]
    fn test_record_from_members() {
        let members = vec![
            member("ds2/a.nc", 10),
            member("ds1/b.nc", 20),
            member("ds2/sub/c.nc", 30),
        ];

        let record = ArchiveRecord::from_members("ds1_ds2_part1_3files", members, None, 7);

        assert_eq!(record.byte_size, 60);
        assert_eq!(record.member_count, 3);
        assert_eq!(record.primary_dataset_id.as_deref(), Some("ds2"));
        assert_eq!(record.dataset_id_list, "ds1,ds2");
        assert_eq!(record.format_tag, "tar");
        assert_eq!(record.status, STATUS_ARCHIVED);
        assert_eq!(record.owner_id, 7);
        assert_eq!(record.created_at, record.modified_at);
    }

    #[test]
    fn test_member_manifest_text() {
        let record =
            ArchiveRecord::from_members("x", vec![member("ds1/a", 1), member("ds1/b", 2)], None, 1);

        let text = record.member_manifest();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "name=ds1/a;size=1;mtime=1700000000;type=0;mode=644;uid=1000;gid=100;uname=;gname="
        );
    }

    #[test]
    fn test_empty_record() {
        let record = ArchiveRecord::from_members("empty", Vec::new(), None, 1);
        assert_eq!(record.primary_dataset_id, None);
        assert_eq!(record.dataset_id_list, "");
        assert_eq!(record.member_manifest(), "");
    }
}
