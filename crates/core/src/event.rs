// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem event types and the event-merge table

use serde::{Deserialize, Serialize};

/// A filesystem event flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEvent {
    Created,
    Modified,
    Deleted,
    /// Internal pseudo-event: a modify produced a new transported basename,
    /// and the artifact under the old basename must be deleted on the
    /// destination before any later operation on that destination's queue.
    DeleteOldFile,
}

/// Outcome of merging a new event into an existing pipeline-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The entry's event becomes this one.
    Replace(FileEvent),
    /// The events cancel each other out; the entry is removed.
    Cancel,
}

impl FileEvent {
    /// Merge successive events for the same path.
    ///
    /// Some combinations should not happen (a second CREATED for an existing
    /// entry, a MODIFIED after a DELETED), but operating-system notification
    /// APIs deliver them anyway, so every pair resolves to something sane.
    /// CREATED followed by DELETED cancels the entry entirely; DELETED
    /// followed by CREATED collapses to MODIFIED.
    pub fn merge(old: FileEvent, new: FileEvent) -> Merge {
        use FileEvent::{Created, Deleted, Modified};
        match (old, new) {
            (Created, Created) => Merge::Replace(Created),
            (Created, Modified) => Merge::Replace(Created),
            (Created, Deleted) => Merge::Cancel,
            (Modified, Created) => Merge::Replace(Modified),
            (Modified, Modified) => Merge::Replace(Modified),
            (Modified, Deleted) => Merge::Replace(Deleted),
            (Deleted, Created) => Merge::Replace(Modified),
            (Deleted, Modified) => Merge::Replace(Modified),
            (Deleted, Deleted) => Merge::Replace(Deleted),
            // The pseudo-event never enters the pipeline queue.
            (_, new) => Merge::Replace(new),
        }
    }

    /// True for events that refer to a file present on disk.
    pub fn touches_source(self) -> bool {
        matches!(self, FileEvent::Created | FileEvent::Modified)
    }
}

impl std::fmt::Display for FileEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileEvent::Created => "created",
            FileEvent::Modified => "modified",
            FileEvent::Deleted => "deleted",
            FileEvent::DeleteOldFile => "delete_old_file",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
