// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: state paths and the PID lock

use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("another instance holds the PID lock at {}", .0.display())]
    LockFailed(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where the daemon keeps its state.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_file: PathBuf,
    /// Databases, the log file and the PID file live here.
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
    pub pid_file: PathBuf,
    /// Intermediate processor output; emptied at startup and clean shutdown.
    pub working_dir: PathBuf,
}

impl Paths {
    pub fn new(config_file: PathBuf, data_dir: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            config_file,
            log_file: data_dir.join("conveyord.log"),
            pid_file: data_dir.join("conveyord.pid"),
            data_dir,
            working_dir,
        }
    }

    /// Pipeline queue and bookkeeping lists.
    pub fn persistent_data_db(&self) -> PathBuf {
        self.data_dir.join("persistent_data.db")
    }

    pub fn synced_files_db(&self) -> PathBuf {
        self.data_dir.join("synced_files.db")
    }

    /// Scanner snapshot for the filesystem monitor.
    pub fn fsmonitor_db(&self) -> PathBuf {
        self.data_dir.join("fsmonitor.db")
    }
}

/// Exclusive PID file: holds an advisory lock for the process lifetime so a
/// second instance fails fast, and exposes the PID for `kill $(cat pidfile)`.
#[derive(Debug)]
pub struct PidLock {
    // Held to maintain the exclusive lock; released on drop.
    _file: File,
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Open without truncating: wiping the file before holding the lock
        // would erase the running daemon's PID.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| LifecycleError::LockFailed(path.to_path_buf()))?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self { _file: file, path: path.to_path_buf() })
    }

    /// Recreate the PID file if something removed it. Called periodically.
    pub fn refresh(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "PID file vanished, recreating");
            std::fs::write(&self.path, format!("{}\n", std::process::id()))?;
        }
        Ok(())
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
