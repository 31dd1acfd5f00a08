// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed persistent FIFO with peek, in-place update and jump-to-front
//!
//! Designed for queues that can grow without bound: only a window over the
//! front of the queue is kept in memory, the rest lives in SQLite. Each item
//! is stored under a caller-chosen key so a queued item can later be updated
//! in place (preserving its position) or removed by key.

use crate::{validate_table_name, Db, StorageError};
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;

const DEFAULT_MAX_IN_MEMORY: usize = 100;
const DEFAULT_MIN_IN_MEMORY: usize = 50;

pub struct PersistentQueue<T> {
    db: Db,
    table: String,
    size: usize,
    /// In-memory mirror of the queue front, ordered by row id.
    window: VecDeque<(i64, T)>,
    min_in_memory: usize,
    max_in_memory: usize,
}

impl<T> PersistentQueue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn open(db: Db, table: &str) -> Result<Self, StorageError> {
        Self::with_window(db, table, DEFAULT_MIN_IN_MEMORY, DEFAULT_MAX_IN_MEMORY)
    }

    pub fn with_window(
        db: Db,
        table: &str,
        min_in_memory: usize,
        max_in_memory: usize,
    ) -> Result<Self, StorageError> {
        validate_table_name(table)?;
        let size = {
            let conn = db.lock();
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} \
                     (id INTEGER PRIMARY KEY AUTOINCREMENT, item BLOB, key CHAR(32))",
                    table
                ),
                [],
            )?;
            conn.execute(
                &format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {table}_unique_key ON {table} (key)",
                    table = table
                ),
                [],
            )?;
            conn.query_row(&format!("SELECT COUNT(id) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })? as usize
        };
        Ok(Self {
            db,
            table: table.to_string(),
            size,
            window: VecDeque::new(),
            min_in_memory,
            max_in_memory: max_in_memory.max(min_in_memory),
        })
    }

    /// Exact number of queued items.
    pub fn qsize(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Append an item under `key`. Fails with [`StorageError::AlreadyExists`]
    /// when an item with that key is already queued.
    pub fn put(&mut self, item: &T, key: &str) -> Result<(), StorageError> {
        let blob = serde_json::to_vec(item)?;
        let res = self.db.lock().execute(
            &format!("INSERT INTO {} (item, key) VALUES (?1, ?2)", self.table),
            rusqlite::params![blob, hash_key(key)],
        );
        match res {
            Ok(_) => {
                self.size += 1;
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => Err(StorageError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the front item without removing it.
    pub fn peek(&mut self) -> Result<T, StorageError> {
        if self.is_empty() {
            return Err(StorageError::Empty);
        }
        self.refill_window()?;
        match self.window.front() {
            Some((_, item)) => Ok(item.clone()),
            None => Err(StorageError::Empty),
        }
    }

    /// Remove and return the front item.
    pub fn get(&mut self) -> Result<T, StorageError> {
        if self.is_empty() {
            return Err(StorageError::Empty);
        }
        self.refill_window()?;
        let (id, item) = match self.window.pop_front() {
            Some(entry) => entry,
            None => return Err(StorageError::Empty),
        };
        self.db
            .lock()
            .execute(&format!("DELETE FROM {} WHERE id = ?1", self.table), [id])?;
        self.size -= 1;
        Ok(item)
    }

    /// Replace the item stored under `key`, preserving its queue position.
    pub fn update(&mut self, item: &T, key: &str) -> Result<(), StorageError> {
        let hashed = hash_key(key);
        let blob = serde_json::to_vec(item)?;
        let id: Option<i64> = {
            let conn = self.db.lock();
            let id = conn
                .query_row(
                    &format!("SELECT id FROM {} WHERE key = ?1", self.table),
                    [&hashed],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(ignore_no_rows)?;
            if id.is_some() {
                conn.execute(
                    &format!("UPDATE {} SET item = ?1 WHERE key = ?2", self.table),
                    rusqlite::params![blob, hashed],
                )?;
            }
            id
        };
        let id = id.ok_or(StorageError::UpdateForNonExistingKey)?;
        if let Some(entry) = self.window.iter_mut().find(|(i, _)| *i == id) {
            entry.1 = item.clone();
        }
        Ok(())
    }

    /// Insert an item at the *front* of the queue, bypassing FIFO order.
    pub fn jump(&mut self, item: &T, key: &str) -> Result<(), StorageError> {
        let blob = serde_json::to_vec(item)?;
        let id = {
            let conn = self.db.lock();
            let min_id: Option<i64> =
                conn.query_row(&format!("SELECT MIN(id) FROM {}", self.table), [], |row| {
                    row.get(0)
                })?;
            let id = min_id.unwrap_or(1) - 1;
            let res = conn.execute(
                &format!("INSERT INTO {} (id, item, key) VALUES (?1, ?2, ?3)", self.table),
                rusqlite::params![id, blob, hash_key(key)],
            );
            match res {
                Ok(_) => id,
                Err(e) if is_constraint_violation(&e) => return Err(StorageError::AlreadyExists),
                Err(e) => return Err(e.into()),
            }
        };
        self.window.push_front((id, item.clone()));
        self.size += 1;
        Ok(())
    }

    /// Look up the queued item for `key`, if any.
    pub fn get_item_for_key(&self, key: &str) -> Result<Option<T>, StorageError> {
        let blob: Option<Vec<u8>> = self
            .db
            .lock()
            .query_row(
                &format!("SELECT item FROM {} WHERE key = ?1", self.table),
                [hash_key(key)],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;
        match blob {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    /// Remove the item stored under `key`, wherever it sits in the queue.
    /// A missing key is a no-op.
    pub fn remove_item_for_key(&mut self, key: &str) -> Result<(), StorageError> {
        let hashed = hash_key(key);
        let id: Option<i64> = {
            let conn = self.db.lock();
            let id = conn
                .query_row(
                    &format!("SELECT id FROM {} WHERE key = ?1", self.table),
                    [&hashed],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(ignore_no_rows)?;
            if id.is_some() {
                conn.execute(&format!("DELETE FROM {} WHERE key = ?1", self.table), [&hashed])?;
            }
            id
        };
        if let Some(id) = id {
            self.window.retain(|(i, _)| *i != id);
            self.size -= 1;
        }
        Ok(())
    }

    /// Whether an identical item (not merely an equal key) is queued.
    pub fn contains(&self, item: &T) -> Result<bool, StorageError> {
        let blob = serde_json::to_vec(item)?;
        let count: i64 = self.db.lock().query_row(
            &format!("SELECT COUNT(item) FROM {} WHERE item = ?1", self.table),
            [blob],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Top the window up from the database so peek/get stay cheap.
    ///
    /// Invariant: the window always mirrors the front of the queue in id
    /// order, so an empty window loads from the start and a partial window
    /// appends rows past its last id.
    fn refill_window(&mut self) -> Result<(), StorageError> {
        if self.window.len() >= self.min_in_memory.max(1) || self.window.len() >= self.size {
            return Ok(());
        }
        let wanted = self.max_in_memory - self.window.len();
        let after = self.window.back().map(|(id, _)| *id);
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, item FROM {} WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
            self.table
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![after.unwrap_or(i64::MIN), wanted as i64],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
        )?;
        let mut fetched = Vec::new();
        for row in rows {
            fetched.push(row?);
        }
        drop(stmt);
        drop(conn);
        for (id, blob) in fetched {
            let item: T = serde_json::from_slice(&blob)?;
            self.window.push_back((id, item));
        }
        Ok(())
    }
}

fn hash_key(key: &str) -> String {
    format!("{:x}", Md5::digest(key.as_bytes()))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn ignore_no_rows<V>(e: rusqlite::Error) -> Result<Option<V>, rusqlite::Error> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
