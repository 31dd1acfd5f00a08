// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-tree scanner with a durable snapshot
//!
//! Maintains a snapshot table of (path, filename, mtime) rows and produces
//! created/modified/deleted deltas on demand. Modifications are detected by
//! mtime change; moves are out of scope and surface as delete + create.
//! Directories are recorded with the sentinel mtime -1. Symlinks are treated
//! as files and never descended into, but their metadata is read through the
//! link so a change behind a symlinked entry still surfaces as a
//! modification; ignored directory names are skipped entirely; listing
//! errors on a subpath silently skip that subpath.

use crate::{validate_table_name, StorageError};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const COMMIT_BATCH: usize = 50;

/// Mtime value recorded for directories.
const DIR_MTIME: i64 = -1;

/// Deltas of one directory (file names relative to the scanned directory;
/// deleted entries may contain separators when a deleted directory expanded
/// to the snapshot rows beneath it).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub created: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

struct Listing {
    filename: String,
    mtime: i64,
    is_dir: bool,
}

pub struct PathScanner {
    conn: Connection,
    table: String,
    ignored_dirs: Vec<String>,
}

impl PathScanner {
    pub fn open(
        db_path: &Path,
        ignored_dirs: Vec<String>,
        table: &str,
    ) -> Result<Self, StorageError> {
        Self::new(Connection::open(db_path)?, ignored_dirs, table)
    }

    pub fn new(
        conn: Connection,
        ignored_dirs: Vec<String>,
        table: &str,
    ) -> Result<Self, StorageError> {
        validate_table_name(table)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (path TEXT, filename TEXT, mtime INTEGER)",
                table
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_file_unique_per_path \
                 ON {table} (path, filename)",
                table = table
            ),
            [],
        )?;
        Ok(Self { conn, table: table.to_string(), ignored_dirs })
    }

    /// Whether snapshot rows exist for this root.
    pub fn has_snapshot(&self, root: &Path) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(filename) FROM {} WHERE path = ?1", self.table),
            [path_str(root)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Walk the tree and record every entry. Returns false without doing any
    /// work when snapshot rows for this root already exist.
    pub fn initial_scan(&mut self, root: &Path) -> Result<bool, StorageError> {
        if self.has_snapshot(root)? {
            return Ok(false);
        }
        let mut rows = Vec::new();
        self.walk(root, &mut rows);
        self.upsert_files(&rows)?;
        Ok(true)
    }

    /// Remove all snapshot rows at or below `root`.
    pub fn purge(&mut self, root: &Path) -> Result<(), StorageError> {
        let root_s = path_str(root);
        self.conn.execute(
            &format!("DELETE FROM {} WHERE path = ?1 OR path LIKE ?2", self.table),
            rusqlite::params![root_s, format!("{}/%", root_s.trim_end_matches('/'))],
        )?;
        Ok(())
    }

    /// Diff the on-disk listing of one directory (non-recursive) against the
    /// snapshot, commit the snapshot updates, and return the deltas.
    ///
    /// Newly created directory trees are not descended into here (use
    /// [`scan_tree`](Self::scan_tree) or rescan the new directory); deleted
    /// directory trees expand to every snapshot row beneath them.
    pub fn scan(&mut self, dir: &Path) -> Result<ScanResult, StorageError> {
        let dir_s = path_str(dir);

        let mut old_files: HashMap<String, i64> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT filename, mtime FROM {} WHERE path = ?1", self.table))?;
            let rows = stmt.query_map([&dir_s], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (filename, mtime) = row?;
                old_files.insert(filename, mtime);
            }
        }

        let mut new_files: HashMap<String, i64> = HashMap::new();
        for entry in self.list_dir(dir) {
            new_files.insert(entry.filename, if entry.is_dir { DIR_MTIME } else { entry.mtime });
        }

        let mut result = ScanResult::default();
        for name in new_files.keys() {
            if !old_files.contains_key(name) {
                result.created.insert(name.clone());
            }
        }
        for (name, old_mtime) in &old_files {
            match new_files.get(name) {
                None => {
                    result.deleted.insert(name.clone());
                }
                Some(new_mtime) if new_mtime != old_mtime => {
                    result.modified.insert(name.clone());
                }
                Some(_) => {}
            }
        }

        // A deleted directory takes its whole snapshot subtree with it.
        let mut deleted_tree = BTreeSet::new();
        for name in &result.deleted {
            if old_files.get(name) == Some(&DIR_MTIME) {
                let subtree = path_str(&dir.join(name));
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT path, filename FROM {} WHERE path = ?1 OR path LIKE ?2",
                    self.table
                ))?;
                let rows = stmt.query_map(
                    rusqlite::params![subtree, format!("{}/%", subtree)],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?;
                for row in rows {
                    let (path, filename) = row?;
                    let full = format!("{}/{}", path.trim_end_matches('/'), filename);
                    if let Some(rel) = full.strip_prefix(&format!("{}/", dir_s.trim_end_matches('/'))) {
                        deleted_tree.insert(rel.to_string());
                    }
                }
            }
        }
        result.deleted.extend(deleted_tree);

        // Commit the new state.
        let created_rows: Vec<(String, String, i64)> = result
            .created
            .iter()
            .filter_map(|n| new_files.get(n).map(|m| (dir_s.clone(), n.clone(), *m)))
            .collect();
        self.upsert_files(&created_rows)?;
        let modified_rows: Vec<(String, String, i64)> = result
            .modified
            .iter()
            .filter_map(|n| new_files.get(n).map(|m| (dir_s.clone(), n.clone(), *m)))
            .collect();
        self.upsert_files(&modified_rows)?;
        let deleted_rows: Vec<(String, String)> = result
            .deleted
            .iter()
            .map(|n| {
                let full = dir.join(n);
                let parent = full.parent().map(path_str).unwrap_or_else(|| dir_s.clone());
                let filename =
                    full.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
                (parent, filename)
            })
            .collect();
        self.delete_files(&deleted_rows)?;

        Ok(result)
    }

    /// Scan a whole tree: the root first, then every descendant directory
    /// currently on disk. Returns one (directory, deltas) pair per directory.
    pub fn scan_tree(&mut self, root: &Path) -> Result<Vec<(PathBuf, ScanResult)>, StorageError> {
        let mut results = Vec::new();
        self.scan_tree_into(root, &mut results)?;
        Ok(results)
    }

    fn scan_tree_into(
        &mut self,
        dir: &Path,
        results: &mut Vec<(PathBuf, ScanResult)>,
    ) -> Result<(), StorageError> {
        let result = self.scan(dir)?;
        results.push((dir.to_path_buf(), result));
        let subdirs: Vec<PathBuf> = self
            .list_dir(dir)
            .into_iter()
            .filter(|e| e.is_dir)
            .map(|e| dir.join(e.filename))
            .collect();
        for subdir in subdirs {
            self.scan_tree_into(&subdir, results)?;
        }
        Ok(())
    }

    /// Insert or replace snapshot rows, committing in batches.
    pub fn upsert_files(&mut self, rows: &[(String, String, i64)]) -> Result<(), StorageError> {
        for chunk in rows.chunks(COMMIT_BATCH) {
            let tx = self.conn.transaction()?;
            for (path, filename, mtime) in chunk {
                tx.execute(
                    &format!("INSERT OR REPLACE INTO {} VALUES (?1, ?2, ?3)", self.table),
                    rusqlite::params![path, filename, mtime],
                )?;
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Delete snapshot rows, committing in batches.
    pub fn delete_files(&mut self, rows: &[(String, String)]) -> Result<(), StorageError> {
        for chunk in rows.chunks(COMMIT_BATCH) {
            let tx = self.conn.transaction()?;
            for (path, filename) in chunk {
                tx.execute(
                    &format!("DELETE FROM {} WHERE path = ?1 AND filename = ?2", self.table),
                    rusqlite::params![path, filename],
                )?;
            }
            tx.commit()?;
        }
        Ok(())
    }

    fn walk(&self, dir: &Path, rows: &mut Vec<(String, String, i64)>) {
        let dir_s = path_str(dir);
        let entries = self.list_dir(dir);
        for entry in &entries {
            rows.push((
                dir_s.clone(),
                entry.filename.clone(),
                if entry.is_dir { DIR_MTIME } else { entry.mtime },
            ));
        }
        for entry in entries {
            if entry.is_dir {
                self.walk(&dir.join(&entry.filename), rows);
            }
        }
    }

    /// List one directory. Metadata is read through symlinks so the mtime
    /// reflects the content an entry resolves to; entries that cannot be
    /// statted (broken symlinks included) are skipped, as is the whole
    /// directory when it cannot be read.
    fn list_dir(&self, dir: &Path) -> Vec<Listing> {
        let read = match std::fs::read_dir(dir) {
            Ok(read) => read,
            Err(_) => return Vec::new(),
        };
        let mut listings = Vec::new();
        for entry in read.flatten() {
            let filename = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if meta.is_dir() && self.ignored_dirs.iter().any(|d| *d == filename) {
                continue;
            }
            // A symlink never counts as a directory, so symlinked trees are
            // recorded as single file entries and not descended into.
            let is_symlink = std::fs::symlink_metadata(&path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(true);
            let is_dir = meta.is_dir() && !is_symlink;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            listings.push(Listing { filename, mtime, is_dir });
        }
        listings
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
