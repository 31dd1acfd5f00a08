// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn pid_lock_writes_the_pid_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conveyord.pid");
    {
        let lock = PidLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        // Refresh restores a vanished PID file.
        std::fs::remove_file(&path).unwrap();
        lock.refresh().unwrap();
        assert!(path.exists());
    }
    // Dropped: the PID file is gone.
    assert!(!path.exists());
}

#[test]
fn second_lock_on_the_same_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conveyord.pid");
    let _held = PidLock::acquire(&path).unwrap();
    let err = PidLock::acquire(&path).unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
}

#[test]
fn paths_derive_database_locations_from_the_data_dir() {
    let paths = Paths::new(
        PathBuf::from("/etc/conveyor/config.xml"),
        PathBuf::from("/var/lib/conveyor"),
        PathBuf::from("/tmp/conveyor"),
    );
    assert_eq!(paths.persistent_data_db(), PathBuf::from("/var/lib/conveyor/persistent_data.db"));
    assert_eq!(paths.synced_files_db(), PathBuf::from("/var/lib/conveyor/synced_files.db"));
    assert_eq!(paths.fsmonitor_db(), PathBuf::from("/var/lib/conveyor/fsmonitor.db"));
    assert_eq!(paths.pid_file, PathBuf::from("/var/lib/conveyor/conveyord.pid"));
    assert_eq!(paths.log_file, PathBuf::from("/var/lib/conveyor/conveyord.log"));
}
