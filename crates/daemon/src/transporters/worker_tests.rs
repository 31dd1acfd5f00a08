// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::transporters::symlink_or_copy::SymlinkOrCopyStorage;
use conveyor_core::Server;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn local_storage(location: &std::path::Path) -> Box<dyn Storage> {
    let mut settings = BTreeMap::new();
    settings.insert("location".to_string(), location.to_string_lossy().into_owned());
    settings.insert("url".to_string(), "http://cdn.example.com".to_string());
    let server = Server {
        name: "cdn".to_string(),
        transporter: "symlink_or_copy".to_string(),
        max_connections: 0,
        settings,
    };
    Box::new(SymlinkOrCopyStorage::from_server(&server).unwrap())
}

#[tokio::test]
async fn add_modify_stores_and_reports_the_url() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("a.css");
    std::fs::write(&src, "x").unwrap();

    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let worker: TransporterWorker<u32> =
        TransporterWorker::spawn("cdn".to_string(), local_storage(dst_dir.path()), reports_tx);

    worker.sync_file(src, "sub/a.css".to_string(), TransportAction::AddModify, 7);
    let report = reports_rx.recv().await.unwrap();

    assert_eq!(report.server, "cdn");
    assert_eq!(report.ctx, 7);
    assert_eq!(report.dst, "sub/a.css");
    assert_eq!(report.result.unwrap().as_deref(), Some("http://cdn.example.com/sub/a.css"));
    assert!(dst_dir.path().join("sub/a.css").exists());
    assert_eq!(worker.qsize(), 0);

    worker.stop();
    worker.join().await;
}

#[tokio::test]
async fn add_modify_replaces_an_existing_artifact() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("a.css");
    std::fs::write(&src, "new").unwrap();
    std::fs::write(dst_dir.path().join("a.css"), "old").unwrap();

    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let worker: TransporterWorker<()> =
        TransporterWorker::spawn("cdn".to_string(), local_storage(dst_dir.path()), reports_tx);

    worker.sync_file(src, "a.css".to_string(), TransportAction::AddModify, ());
    reports_rx.recv().await.unwrap().result.unwrap();
    assert_eq!(std::fs::read_to_string(dst_dir.path().join("a.css")).unwrap(), "new");

    worker.stop();
    worker.join().await;
}

#[tokio::test]
async fn delete_reports_no_url_and_tolerates_absence() {
    let dst_dir = TempDir::new().unwrap();
    std::fs::write(dst_dir.path().join("a.css"), "x").unwrap();

    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let worker: TransporterWorker<()> =
        TransporterWorker::spawn("cdn".to_string(), local_storage(dst_dir.path()), reports_tx);

    worker.sync_file(PathBuf::new(), "a.css".to_string(), TransportAction::Delete, ());
    assert_eq!(reports_rx.recv().await.unwrap().result.unwrap(), None);
    assert!(!dst_dir.path().join("a.css").exists());

    worker.sync_file(PathBuf::new(), "a.css".to_string(), TransportAction::Delete, ());
    assert!(reports_rx.recv().await.unwrap().result.is_ok());

    worker.stop();
    worker.join().await;
}

#[tokio::test]
async fn failures_are_reported_not_swallowed() {
    let dst_dir = TempDir::new().unwrap();
    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let worker: TransporterWorker<()> =
        TransporterWorker::spawn("cdn".to_string(), local_storage(dst_dir.path()), reports_tx);

    // Source file does not exist, so ADD_MODIFY fails.
    worker.sync_file(
        PathBuf::from("/does/not/exist.css"),
        "exist.css".to_string(),
        TransportAction::AddModify,
        (),
    );
    assert!(reports_rx.recv().await.unwrap().result.is_err());

    worker.stop();
    worker.join().await;
}

#[tokio::test]
async fn operations_complete_in_queue_order() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(src_dir.path().join(name), name).unwrap();
    }

    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let worker: TransporterWorker<&'static str> =
        TransporterWorker::spawn("cdn".to_string(), local_storage(dst_dir.path()), reports_tx);

    for name in ["a", "b", "c"] {
        worker.sync_file(
            src_dir.path().join(name),
            name.to_string(),
            TransportAction::AddModify,
            name,
        );
    }
    for expected in ["a", "b", "c"] {
        assert_eq!(reports_rx.recv().await.unwrap().ctx, expected);
    }

    worker.stop();
    worker.join().await;
}
