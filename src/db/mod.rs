//! SQLite catalog of archives and member associations
//!
//! ```text
//!   FileCollector ──is_archived──┐
//!                                ▼
//!                             Catalog ◄── register / add-user / locate
//!                                ▲
//!   ArchiveRecord ──record── CatalogWriter
//! ```
//!
//! One `Catalog` is opened per unit of work and lent to whoever needs it.

pub mod catalog;
pub mod record;
pub mod schema;
pub mod writer;

pub use catalog::{ArchiveLocation, Catalog};
pub use record::ArchiveRecord;
pub use schema::keys;
pub use writer::{CatalogWriter, RecordOutcome};
