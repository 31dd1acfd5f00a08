// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;
use FileEvent::{Created, Deleted, Modified};

#[parameterized(
    created_then_modified = { Created, Modified, Merge::Replace(Created) },
    created_then_created = { Created, Created, Merge::Replace(Created) },
    modified_then_modified = { Modified, Modified, Merge::Replace(Modified) },
    modified_then_created = { Modified, Created, Merge::Replace(Modified) },
    modified_then_deleted = { Modified, Deleted, Merge::Replace(Deleted) },
    deleted_then_created = { Deleted, Created, Merge::Replace(Modified) },
    deleted_then_modified = { Deleted, Modified, Merge::Replace(Modified) },
    deleted_then_deleted = { Deleted, Deleted, Merge::Replace(Deleted) },
)]
fn merge_table(old: FileEvent, new: FileEvent, expected: Merge) {
    assert_eq!(FileEvent::merge(old, new), expected);
}

#[test]
fn create_then_delete_cancels() {
    assert_eq!(FileEvent::merge(Created, Deleted), Merge::Cancel);
}

#[test]
fn touches_source() {
    assert!(Created.touches_source());
    assert!(Modified.touches_source());
    assert!(!Deleted.touches_source());
    assert!(!FileEvent::DeleteOldFile.touches_source());
}

#[test]
fn serde_round_trip() {
    let json = serde_json::to_string(&Deleted).unwrap();
    assert_eq!(json, "\"deleted\"");
    let back: FileEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Deleted);
}
