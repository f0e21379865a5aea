//! Member-listing dump (`.mbr`)
//!
//! Written after a container is finished, one line per member in the
//! `tar -tv` layout:
//!
//! ```text
//! -rw-r--r-- 1000/100     20480 2024-03-01 12:30 ds084.1/2020/file.grb
//! ```
//!
//! The dump is both an audit artifact and the durable input for rebuilding
//! the catalog manifest without reopening the container. Its presence also
//! marks a build as complete.

use crate::collect::types::{EntryType, FileDescriptor, Permissions};
use crate::error::{ArchiveError, ArchiveResult};
use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Regex for one listing line
static LISTING_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([-dlcbps?])([-rwxsStT]{9})\s+([^\s/]+)/(\S+)\s+(\d+)\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\s+(.+)$",
    )
    .expect("Invalid listing line regex")
});

/// One archive member as recorded in a listing dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    /// Entry type
    pub entry_type: EntryType,
    /// Permission bits
    pub permissions: Permissions,
    /// Owner (numeric uid or user name)
    pub owner: String,
    /// Group (numeric gid or group name)
    pub group: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time (Unix timestamp, minute resolution once parsed)
    pub mtime: i64,
    /// Name inside the archive, relative to the archive root
    pub name: String,
}

impl MemberEntry {
    /// Build an entry for a file being added under `name`
    pub fn from_descriptor(desc: &FileDescriptor, name: String) -> Self {
        Self {
            entry_type: desc.entry_type(),
            permissions: desc.permissions(),
            owner: desc.uid.to_string(),
            group: desc.gid.to_string(),
            size: desc.size,
            mtime: desc.mtime,
            name,
        }
    }

    /// Format as a listing line (no trailing newline)
    pub fn to_listing_line(&self) -> String {
        format!(
            "{}{} {}/{} {:>9} {} {}",
            self.entry_type.as_char(),
            self.permissions.to_rwx_string(),
            self.owner,
            self.group,
            self.size,
            format_mtime(self.mtime),
            self.name
        )
    }

    /// Parse a listing line
    ///
    /// Returns `None` for lines that do not match the layout.
    pub fn parse_listing_line(line: &str) -> Option<Self> {
        let caps = LISTING_LINE_REGEX.captures(line.trim_end())?;
        let type_char = caps.get(1)?.as_str().chars().next()?;

        Some(Self {
            entry_type: EntryType::from_char(type_char),
            permissions: Permissions::parse_rwx(caps.get(2)?.as_str())?,
            owner: caps.get(3)?.as_str().to_string(),
            group: caps.get(4)?.as_str().to_string(),
            size: caps.get(5)?.as_str().parse().ok()?,
            mtime: parse_mtime(caps.get(6)?.as_str()),
            name: caps.get(7)?.as_str().to_string(),
        })
    }

    /// Dataset identifier: the first segment of the member name
    pub fn dataset_id(&self) -> &str {
        self.name.split_once('/').map_or(self.name.as_str(), |(ds, _)| ds)
    }

    /// Path within the dataset (empty for a bare top-level name)
    pub fn relative_path(&self) -> &str {
        self.name.split_once('/').map_or("", |(_, rel)| rel)
    }

    /// Catalog manifest encoding: `name=..;size=..;mtime=..;type=..;mode=..;uid=..;gid=..;uname=..;gname=..`
    pub fn manifest_line(&self) -> String {
        let uid: u32 = self.owner.parse().unwrap_or(0);
        let gid: u32 = self.group.parse().unwrap_or(0);
        let uname = if self.owner.parse::<u32>().is_ok() { "" } else { self.owner.as_str() };
        let gname = if self.group.parse::<u32>().is_ok() { "" } else { self.group.as_str() };
        format!(
            "name={};size={};mtime={};type={};mode={:o};uid={};gid={};uname={};gname={}",
            self.name,
            self.size,
            self.mtime,
            self.entry_type.as_tar_type(),
            self.permissions.bits(),
            uid,
            gid,
            uname,
            gname
        )
    }
}

/// Format a Unix timestamp as local `YYYY-MM-DD HH:MM`
pub fn format_mtime(mtime: i64) -> String {
    match Local.timestamp_opt(mtime, 0).earliest() {
        Some(t) => t.format(TIME_FORMAT).to_string(),
        None => "1970-01-01 00:00".to_string(),
    }
}

/// Parse local `YYYY-MM-DD HH:MM` into a Unix timestamp (0 if invalid)
pub fn parse_mtime(s: &str) -> i64 {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|t| t.timestamp())
        .unwrap_or(0)
}

/// Write a listing dump
pub fn write_listing(path: &Path, members: &[MemberEntry]) -> ArchiveResult<()> {
    let to_err = |e: std::io::Error| ArchiveError::Listing {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut out = BufWriter::new(File::create(path).map_err(to_err)?);
    for member in members {
        writeln!(out, "{}", member.to_listing_line()).map_err(to_err)?;
    }
    let file = out.into_inner().map_err(|e| to_err(e.into_error()))?;
    file.sync_all().map_err(to_err)?;
    Ok(())
}

/// Read the regular-file members of a listing dump
///
/// Directory lines, names ending in `/` and unparseable lines are skipped.
pub fn read_listing(path: &Path) -> ArchiveResult<Vec<MemberEntry>> {
    let content = fs::read_to_string(path).map_err(|e| ArchiveError::Listing {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(MemberEntry::parse_listing_line)
        .filter(|m| m.entry_type.is_file() && !m.name.ends_with('/'))
        .collect())
}
