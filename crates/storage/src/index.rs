// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synced-files index: which artifact is currently published where
//!
//! One row per (input file, server). The row records the basename the
//! artifact was transported under (which may differ from the input basename
//! after processing) and the public URL the destination reported.

use crate::StorageError;
use rusqlite::Connection;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedFile {
    pub input_file: String,
    pub transported_file_basename: String,
    pub url: String,
    pub server: String,
}

pub struct SyncedFileIndex {
    conn: Connection,
}

impl SyncedFileIndex {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS synced_files (\
             input_file TEXT, transported_file_basename TEXT, url TEXT, server TEXT)",
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS file_unique_per_server \
             ON synced_files (input_file, server)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Insert a new row. Fails with [`StorageError::AlreadyExists`] when the
    /// (input file, server) pair is already recorded — the caller decides
    /// whether that is an error or a duplicated delivery to shrug off.
    pub fn record(
        &mut self,
        input_file: &str,
        basename: &str,
        url: &str,
        server: &str,
    ) -> Result<(), StorageError> {
        let res = self.conn.execute(
            "INSERT INTO synced_files VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![input_file, basename, url, server],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn lookup(
        &self,
        input_file: &str,
        server: &str,
    ) -> Result<Option<SyncedFile>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT input_file, transported_file_basename, url, server \
                 FROM synced_files WHERE input_file = ?1 AND server = ?2",
                [input_file, server],
                |row| {
                    Ok(SyncedFile {
                        input_file: row.get(0)?,
                        transported_file_basename: row.get(1)?,
                        url: row.get(2)?,
                        server: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    /// The transported basename for this input on any server. Used to
    /// synthesize the destination path of a DELETE for a file that no longer
    /// exists locally.
    pub fn transported_basename(&self, input_file: &str) -> Result<Option<String>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT transported_file_basename FROM synced_files WHERE input_file = ?1",
                [input_file],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    pub fn is_synced(&self, input_file: &str, server: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM synced_files WHERE input_file = ?1 AND server = ?2",
            [input_file, server],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn update(
        &mut self,
        input_file: &str,
        server: &str,
        basename: &str,
        url: &str,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE synced_files SET transported_file_basename = ?1, url = ?2 \
             WHERE input_file = ?3 AND server = ?4",
            rusqlite::params![basename, url, input_file, server],
        )?;
        Ok(())
    }

    pub fn delete(&mut self, input_file: &str, server: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM synced_files WHERE input_file = ?1 AND server = ?2",
            [input_file, server],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(input_file) FROM synced_files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All rows for one input file, across servers.
    pub fn rows_for(&self, input_file: &str) -> Result<Vec<SyncedFile>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT input_file, transported_file_basename, url, server \
             FROM synced_files WHERE input_file = ?1 ORDER BY server",
        )?;
        let mapped = stmt.query_map([input_file], |row| {
            Ok(SyncedFile {
                input_file: row.get(0)?,
                transported_file_basename: row.get(1)?,
                url: row.get(2)?,
                server: row.get(3)?,
            })
        })?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        Ok(rows)
    }
}

/// One-off URL lookup against a synced-files database.
///
/// Processors that resolve references to other synced files (the CSS link
/// rewriter) run on worker threads and open their own short-lived read
/// connection instead of touching the arbitrator's.
pub fn lookup_url(
    db_path: &Path,
    input_file: &str,
    server: Option<&str>,
) -> Result<Option<String>, StorageError> {
    let conn = Connection::open(db_path)?;
    let res = match server {
        Some(server) => conn.query_row(
            "SELECT url FROM synced_files WHERE input_file = ?1 AND server = ?2",
            [input_file, server],
            |row| row.get::<_, String>(0),
        ),
        None => conn.query_row(
            "SELECT url FROM synced_files WHERE input_file = ?1",
            [input_file],
            |row| row.get::<_, String>(0),
        ),
    };
    res.map(Some).or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    })
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
