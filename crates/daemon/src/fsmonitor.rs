// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem monitor: native notifications over a durable snapshot
//!
//! The native backend (or its polling fallback) only *triggers* work: every
//! notification leads to a scanner diff of the affected directory, and the
//! scanner's deltas are what reach the subscriber. The snapshot therefore
//! stays current by construction, which is what makes startup replay work:
//! adding a directory whose snapshot exists synthesizes the events that
//! happened while the daemon was not running.
//!
//! Directory events are suppressed — only file paths are emitted. Deletions
//! pass through as-is, since a deleted path can no longer be statted.

use conveyor_core::FileEvent;
use conveyor_storage::{PathScanner, ScanResult, StorageError};
use notify::Watcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Event-mask bits for [`FsMonitor::add_dir`].
pub mod event_mask {
    pub const CREATED: u32 = 0x0000_0001;
    pub const MODIFIED: u32 = 0x0000_0002;
    pub const DELETED: u32 = 0x0000_0004;
    pub const ALL: u32 = CREATED | MODIFIED | DELETED;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEventKind {
    Created,
    Modified,
    Deleted,
    /// The backend lost events for this root; the subscriber should request
    /// a rescan, which converts the loss into synthetic events.
    DroppedEvents,
}

impl MonitorEventKind {
    fn mask(self) -> u32 {
        match self {
            MonitorEventKind::Created => event_mask::CREATED,
            MonitorEventKind::Modified => event_mask::MODIFIED,
            MonitorEventKind::Deleted => event_mask::DELETED,
            MonitorEventKind::DroppedEvents => event_mask::ALL,
        }
    }

    pub fn to_file_event(self) -> Option<FileEvent> {
        match self {
            MonitorEventKind::Created => Some(FileEvent::Created),
            MonitorEventKind::Modified => Some(FileEvent::Modified),
            MonitorEventKind::Deleted => Some(FileEvent::Deleted),
            MonitorEventKind::DroppedEvents => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorEvent {
    /// The monitored root this event belongs to.
    pub root: PathBuf,
    /// Absolute file path; `None` only for [`MonitorEventKind::DroppedEvents`].
    pub path: Option<PathBuf>,
    pub kind: MonitorEventKind,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cannot initialize filesystem watcher: {0}")]
    Watcher(String),
}

enum Command {
    AddDir { root: PathBuf, mask: u32 },
    RemoveDir { root: PathBuf },
    Rescan { root: PathBuf },
    Stop,
}

/// Handle to the monitor task. `add_dir`/`remove_dir`/`rescan` are
/// asynchronous: they enqueue a command the monitor loop applies.
pub struct FsMonitor {
    commands: mpsc::UnboundedSender<Command>,
    handle: tokio::task::JoinHandle<()>,
}

impl FsMonitor {
    /// Start the monitor. The scanner snapshot lives in `db_path`; events
    /// are delivered on `events`.
    pub fn spawn(
        db_path: &Path,
        ignored_dirs: Vec<String>,
        events: mpsc::UnboundedSender<MonitorEvent>,
    ) -> Result<Self, MonitorError> {
        let scanner = PathScanner::open(db_path, ignored_dirs.clone(), "pathscanner")?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let watcher = make_watcher(raw_tx)?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = MonitorTask {
            scanner,
            watcher,
            ignored_dirs,
            roots: HashMap::new(),
            events,
        };
        let handle = tokio::spawn(task.run(command_rx, raw_rx));
        Ok(Self { commands, handle })
    }

    pub fn add_dir(&self, root: &Path, mask: u32) {
        let _ = self.commands.send(Command::AddDir { root: root.to_path_buf(), mask });
    }

    pub fn remove_dir(&self, root: &Path) {
        let _ = self.commands.send(Command::RemoveDir { root: root.to_path_buf() });
    }

    /// Diff the whole tree against the snapshot and emit the deltas as
    /// synthetic events.
    pub fn rescan(&self, root: &Path) {
        let _ = self.commands.send(Command::Rescan { root: root.to_path_buf() });
    }

    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop);
        let _ = self.handle.await;
    }
}

/// The recommended native watcher, falling back to polling when the native
/// backend cannot initialize.
fn make_watcher(
    raw_tx: mpsc::UnboundedSender<Result<notify::Event, notify::Error>>,
) -> Result<Box<dyn Watcher + Send>, MonitorError> {
    let tx = raw_tx.clone();
    match notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let _ = tx.send(res);
    }) {
        Ok(watcher) => Ok(Box::new(watcher)),
        Err(native_err) => {
            tracing::warn!(
                error = %native_err,
                "native filesystem notification unavailable, falling back to polling"
            );
            let config = notify::Config::default()
                .with_poll_interval(std::time::Duration::from_secs(2));
            let poller = notify::PollWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    let _ = raw_tx.send(res);
                },
                config,
            )
            .map_err(|e| MonitorError::Watcher(e.to_string()))?;
            Ok(Box::new(poller))
        }
    }
}

struct MonitorTask {
    scanner: PathScanner,
    watcher: Box<dyn Watcher + Send>,
    ignored_dirs: Vec<String>,
    /// Monitored root to its event mask.
    roots: HashMap<PathBuf, u32>,
    events: mpsc::UnboundedSender<MonitorEvent>,
}

impl MonitorTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut raw: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::AddDir { root, mask }) => self.add_dir(root, mask),
                    Some(Command::RemoveDir { root }) => self.remove_dir(&root),
                    Some(Command::Rescan { root }) => self.rescan(&root),
                    Some(Command::Stop) | None => break,
                },
                event = raw.recv() => match event {
                    Some(first) => {
                        // Drain the burst so one directory is scanned once.
                        let mut batch = vec![first];
                        while let Ok(more) = raw.try_recv() {
                            batch.push(more);
                        }
                        self.handle_raw_batch(batch);
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("filesystem monitor stopped");
    }

    fn add_dir(&mut self, root: PathBuf, mask: u32) {
        match self.scanner.has_snapshot(&root) {
            Ok(true) => {
                // Replay what happened while we were not watching.
                tracing::info!(root = %root.display(), "replaying missed events from snapshot");
                self.emit_tree_diff(&root, &root, mask);
            }
            Ok(false) => match self.scanner.initial_scan(&root) {
                Ok(_) => {
                    tracing::info!(root = %root.display(), "completed initial scan");
                }
                Err(e) => {
                    tracing::error!(root = %root.display(), error = %e, "initial scan failed");
                }
            },
            Err(e) => {
                tracing::error!(root = %root.display(), error = %e, "cannot read snapshot");
            }
        }

        if let Err(e) = self.watcher.watch(&root, notify::RecursiveMode::Recursive) {
            tracing::error!(root = %root.display(), error = %e, "cannot watch directory");
        }
        self.roots.insert(root, mask);
    }

    fn remove_dir(&mut self, root: &Path) {
        let _ = self.watcher.unwatch(root);
        self.roots.remove(root);
    }

    fn rescan(&mut self, root: &Path) {
        let mask = self.roots.get(root).copied().unwrap_or(event_mask::ALL);
        self.emit_tree_diff(&root.to_path_buf(), root, mask);
    }

    fn handle_raw_batch(&mut self, batch: Vec<Result<notify::Event, notify::Error>>) {
        // (root, directory) pairs to diff, deduplicated across the batch.
        let mut dirs: Vec<(PathBuf, PathBuf, u32)> = Vec::new();
        let mut dropped: Vec<PathBuf> = Vec::new();

        for res in batch {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "watch backend error");
                    for root in self.roots.keys() {
                        dropped.push(root.clone());
                    }
                    continue;
                }
            };
            if event.need_rescan() {
                for path in &event.paths {
                    if let Some((root, _)) = self.owning_root(path) {
                        dropped.push(root);
                    }
                }
                if event.paths.is_empty() {
                    for root in self.roots.keys() {
                        dropped.push(root.clone());
                    }
                }
                continue;
            }
            for path in &event.paths {
                let Some((root, mask)) = self.owning_root(path) else { continue };
                if self.in_ignored_dir(path) {
                    continue;
                }
                let dir = if path == &root {
                    root.clone()
                } else {
                    path.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone())
                };
                if !dirs.iter().any(|(_, d, _)| d == &dir) {
                    dirs.push((root, dir, mask));
                }
            }
        }

        for (root, dir, mask) in dirs {
            self.scan_and_emit(&root, &dir, mask);
        }

        dropped.sort();
        dropped.dedup();
        for root in dropped {
            let _ = self.events.send(MonitorEvent {
                root,
                path: None,
                kind: MonitorEventKind::DroppedEvents,
            });
        }
    }

    fn owning_root(&self, path: &Path) -> Option<(PathBuf, u32)> {
        self.roots
            .iter()
            .find(|(root, _)| path.starts_with(root))
            .map(|(root, mask)| (root.clone(), *mask))
    }

    fn in_ignored_dir(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            std::path::Component::Normal(s) => {
                let s = s.to_string_lossy();
                self.ignored_dirs.iter().any(|d| *d == s)
            }
            _ => false,
        })
    }

    /// Diff one directory and emit the deltas; newly created directories are
    /// walked so the files inside them surface too.
    fn scan_and_emit(&mut self, root: &PathBuf, dir: &Path, mask: u32) {
        let result = match self.scanner.scan(dir) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "scan failed");
                return;
            }
        };
        self.emit_result(root, dir, &result, mask);

        for name in &result.created {
            let full = dir.join(name);
            if is_real_dir(&full) {
                self.emit_tree_diff(root, &full, mask);
            }
        }
    }

    /// Diff a whole subtree (root-first) and emit the deltas.
    fn emit_tree_diff(&mut self, root: &PathBuf, start: &Path, mask: u32) {
        let results = match self.scanner.scan_tree(start) {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(root = %start.display(), error = %e, "tree scan failed");
                return;
            }
        };
        for (dir, result) in results {
            self.emit_result(root, &dir, &result, mask);
        }
    }

    fn emit_result(&self, root: &PathBuf, dir: &Path, result: &ScanResult, mask: u32) {
        let mut send = |kind: MonitorEventKind, name: &String| {
            if mask & kind.mask() == 0 {
                return;
            }
            let path = dir.join(name);
            // Suppress directory events; deletions cannot be statted and
            // pass through.
            if kind != MonitorEventKind::Deleted && is_real_dir(&path) {
                return;
            }
            let _ = self.events.send(MonitorEvent {
                root: root.clone(),
                path: Some(path),
                kind,
            });
        };
        for name in &result.created {
            send(MonitorEventKind::Created, name);
        }
        for name in &result.modified {
            send(MonitorEventKind::Modified, name);
        }
        for name in &result.deleted {
            send(MonitorEventKind::Deleted, name);
        }
    }
}

/// A directory in the walkable sense: a symlink to a directory counts as a
/// file, like everywhere else in the pipeline.
fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
#[path = "fsmonitor_tests.rs"]
mod tests;

