//! Catalog schema definitions and creation
//!
//! The catalog holds one row per archive, one row per registered dataset,
//! and one member association per dataset file. Associations live in a
//! single table keyed by `(dataset_id, relative_path)`.

use crate::error::DbResult;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the archives table
/// `name` is the idempotency key; upserts conflict on it.
const CREATE_ARCHIVES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS archives (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    byte_size INTEGER NOT NULL,
    member_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    format_tag TEXT NOT NULL,
    checksum TEXT,
    status TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    primary_dataset_id TEXT,
    dataset_id_list TEXT NOT NULL,
    member_manifest TEXT NOT NULL    -- one `name=..;size=..;...` line per member
)
"#;

/// SQL to create the registered datasets table
const CREATE_DATASETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    dataset_id TEXT PRIMARY KEY,
    root_path TEXT,
    registered_at TEXT NOT NULL
)
"#;

/// SQL to create the member associations table
/// archive_id NULL or <= 0 means "not yet archived".
const CREATE_ASSOCIATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS member_associations (
    dataset_id TEXT NOT NULL,
    relative_path TEXT NOT NULL,
    archive_id INTEGER,
    PRIMARY KEY (dataset_id, relative_path)
)
"#;

/// SQL to create the users table (owner identity lookup)
const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    logname TEXT NOT NULL UNIQUE
)
"#;

/// SQL to create catalog metadata table
const CREATE_CATALOG_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Tables that must exist for a catalog to be usable
pub const REQUIRED_TABLES: &[&str] = &["archives", "datasets", "member_associations", "users"];

/// SQL to create indexes for common queries
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_assoc_archive ON member_associations(archive_id)",
    "CREATE INDEX IF NOT EXISTS idx_archives_dataset ON archives(primary_dataset_id)",
];

/// SQLite pragmas applied on every connection
const CONNECTION_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
"#;

/// Apply connection pragmas
pub fn configure_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(())
}

/// Create the catalog schema (idempotent)
pub fn create_catalog(conn: &Connection) -> DbResult<()> {
    conn.execute(CREATE_ARCHIVES_TABLE, [])?;
    conn.execute(CREATE_DATASETS_TABLE, [])?;
    conn.execute(CREATE_ASSOCIATIONS_TABLE, [])?;
    conn.execute(CREATE_USERS_TABLE, [])?;
    conn.execute(CREATE_CATALOG_INFO_TABLE, [])?;

    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    set_catalog_info(conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
    set_catalog_info(conn, keys::TOOL_VERSION, env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

/// Names of required tables missing from the connected database
pub fn missing_tables(conn: &Connection) -> DbResult<Vec<&'static str>> {
    let mut stmt =
        conn.prepare_cached("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let count: i64 = stmt.query_row([table], |row| row.get(0))?;
        if count == 0 {
            missing.push(*table);
        }
    }
    Ok(missing)
}

/// Store catalog metadata
pub fn set_catalog_info(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT INTO catalog_info (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

/// Get catalog metadata
pub fn get_catalog_info(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM catalog_info WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Metadata keys used by the catalog
pub mod keys {
    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Version of the tool that created the catalog
    pub const TOOL_VERSION: &str = "tool_version";
}
