// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conveyor-storage: durable structures backing the pipeline
//!
//! Everything here is SQLite-backed and commits each mutation before
//! returning, so queue and list contents survive a crash at any point.

pub mod index;
pub mod list;
pub mod queue;
pub mod scanner;

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub use index::{SyncedFile, SyncedFileIndex};
pub use list::PersistentList;
pub use queue::PersistentQueue;
pub use scanner::{PathScanner, ScanResult};

/// Shared handle to one SQLite database file.
///
/// The queue and list structures for one daemon share a single connection to
/// the persistent-data database; the synced-files index and the scanner
/// snapshot each use their own file.
pub type Db = Arc<Mutex<rusqlite::Connection>>;

/// Open (or create) a database file and wrap it for sharing.
pub fn open_db(path: &Path) -> Result<Db, StorageError> {
    let conn = rusqlite::Connection::open(path)?;
    Ok(Arc::new(Mutex::new(conn)))
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("queue is empty")]
    Empty,
    #[error("an item already exists for this key")]
    AlreadyExists,
    #[error("no item exists for this key")]
    UpdateForNonExistingKey,
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Validate a table name before splicing it into SQL. Table names are
/// internal identifiers, never user input, but the check keeps it that way.
pub(crate) fn validate_table_name(table: &str) -> Result<(), StorageError> {
    let ok = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName(table.to_string()))
    }
}
