// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable ordered set with a full in-memory mirror
//!
//! Backs the small bookkeeping lists of the pipeline (files in pipeline,
//! failed files, scheduled deletions). Appending a present item and removing
//! an absent one are no-ops, which keeps multi-rule completion idempotent.

use crate::{validate_table_name, Db, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

pub struct PersistentList<T> {
    db: Db,
    table: String,
    /// Insertion-ordered mirror of the table, by ascending row id.
    items: Vec<(i64, T)>,
    ids: HashMap<T, i64>,
}

impl<T> PersistentList<T>
where
    T: Serialize + DeserializeOwned + Clone + Eq + Hash,
{
    pub fn open(db: Db, table: &str) -> Result<Self, StorageError> {
        validate_table_name(table)?;
        let rows: Vec<(i64, Vec<u8>)> = {
            let conn = db.lock();
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} \
                     (id INTEGER PRIMARY KEY AUTOINCREMENT, item BLOB)",
                    table
                ),
                [],
            )?;
            let mut stmt =
                conn.prepare(&format!("SELECT id, item FROM {} ORDER BY id ASC", table))?;
            let mapped = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            rows
        };
        let mut items = Vec::with_capacity(rows.len());
        let mut ids = HashMap::with_capacity(rows.len());
        for (id, blob) in rows {
            let item: T = serde_json::from_slice(&blob)?;
            ids.insert(item.clone(), id);
            items.push((id, item));
        }
        Ok(Self { db, table: table.to_string(), items, ids })
    }

    /// Append an item; a present item is left untouched.
    pub fn append(&mut self, item: &T) -> Result<(), StorageError> {
        if self.ids.contains_key(item) {
            return Ok(());
        }
        let blob = serde_json::to_vec(item)?;
        let id = {
            let conn = self.db.lock();
            conn.execute(&format!("INSERT INTO {} (item) VALUES (?1)", self.table), [blob])?;
            conn.last_insert_rowid()
        };
        self.ids.insert(item.clone(), id);
        self.items.push((id, item.clone()));
        Ok(())
    }

    /// Remove an item; an absent item is a no-op.
    pub fn remove(&mut self, item: &T) -> Result<(), StorageError> {
        let id = match self.ids.remove(item) {
            Some(id) => id,
            None => return Ok(()),
        };
        self.db
            .lock()
            .execute(&format!("DELETE FROM {} WHERE id = ?1", self.table), [id])?;
        self.items.retain(|(i, _)| *i != id);
        Ok(())
    }

    pub fn contains(&self, item: &T) -> bool {
        self.ids.contains_key(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|(_, item)| item)
    }

    /// Snapshot of the contents in insertion order.
    pub fn items(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod tests;
