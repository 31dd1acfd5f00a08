// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use conveyor_storage::SyncedFileIndex;
use tempfile::TempDir;

struct Site {
    _root: TempDir,
    document_root: PathBuf,
    css: PathBuf,
    image: PathBuf,
    db: PathBuf,
    working_dir: PathBuf,
}

/// A document root with `/styles/main.css` referencing `/images/logo.png`.
fn site(css_body: &str) -> Site {
    let root = TempDir::new().unwrap();
    let document_root = root.path().join("htdocs");
    let css = document_root.join("styles/main.css");
    let image = document_root.join("images/logo.png");
    std::fs::create_dir_all(css.parent().unwrap()).unwrap();
    std::fs::create_dir_all(image.parent().unwrap()).unwrap();
    std::fs::write(&css, css_body).unwrap();
    std::fs::write(&image, "png").unwrap();
    let working_dir = root.path().join("work");
    std::fs::create_dir_all(&working_dir).unwrap();
    Site {
        db: root.path().join("synced.db"),
        document_root,
        css,
        image,
        working_dir,
        _root: root,
    }
}

fn process(site: &Site, server: Option<&str>) -> Result<PathBuf, ProcessorError> {
    let ctx = ProcessContext {
        input_file: &site.css,
        original_file: &site.css,
        document_root: Some(&site.document_root),
        base_path: Some("/"),
        process_for_server: server,
        working_dir: &site.working_dir,
        synced_files_db: &site.db,
    };
    CssUrlUpdater.process(&ctx)
}

#[test]
fn rewrites_synced_references() {
    let site = site("body { background: url(../images/logo.png); }");
    let mut idx = SyncedFileIndex::open(&site.db).unwrap();
    idx.record(
        &site.image.to_string_lossy(),
        "logo.png",
        "http://cdn.example.com/images/logo.png",
        "cdn",
    )
    .unwrap();

    let output = process(&site, Some("cdn")).unwrap();
    let rewritten = std::fs::read_to_string(&output).unwrap();
    assert_eq!(rewritten, "body { background: url(http://cdn.example.com/images/logo.png); }");
}

#[test]
fn resolves_root_relative_references_under_the_document_root() {
    let site = site(r#"body { background: url("/images/logo.png"); }"#);
    let mut idx = SyncedFileIndex::open(&site.db).unwrap();
    idx.record(&site.image.to_string_lossy(), "logo.png", "http://cdn/l.png", "cdn").unwrap();

    let output = process(&site, Some("cdn")).unwrap();
    assert!(std::fs::read_to_string(&output).unwrap().contains("url(http://cdn/l.png)"));
}

#[test]
fn unsynced_references_request_a_requeue() {
    let site = site("body { background: url(../images/logo.png); }");
    // No index rows at all.
    SyncedFileIndex::open(&site.db).unwrap();

    let err = process(&site, Some("cdn")).unwrap_err();
    assert!(matches!(err, ProcessorError::Requeue(_)));
}

#[test]
fn references_synced_to_another_server_still_requeue() {
    let site = site("body { background: url(../images/logo.png); }");
    let mut idx = SyncedFileIndex::open(&site.db).unwrap();
    idx.record(&site.image.to_string_lossy(), "logo.png", "http://other/l.png", "other").unwrap();

    let err = process(&site, Some("cdn")).unwrap_err();
    assert!(matches!(err, ProcessorError::Requeue(_)));
}

#[test]
fn external_and_broken_references_are_left_alone() {
    let site = site(
        "a { background: url(https://example.com/x.png); }\n\
         b { background: url(data:image/gif;base64,R0lGOD); }\n\
         c { background: url(../images/missing.png); }",
    );
    SyncedFileIndex::open(&site.db).unwrap();

    let output = process(&site, Some("cdn")).unwrap();
    let rewritten = std::fs::read_to_string(&output).unwrap();
    assert!(rewritten.contains("url(https://example.com/x.png)"));
    assert!(rewritten.contains("url(data:image/gif;base64,R0lGOD)"));
    assert!(rewritten.contains("url(../images/missing.png)"));
}

#[test]
fn requires_document_root_and_base_path() {
    let site = site("body {}");
    let ctx = ProcessContext {
        input_file: &site.css,
        original_file: &site.css,
        document_root: None,
        base_path: None,
        process_for_server: None,
        working_dir: &site.working_dir,
        synced_files_db: &site.db,
    };
    let err = CssUrlUpdater.process(&ctx).unwrap_err();
    assert!(matches!(err, ProcessorError::DocumentRootAndBasePathRequired));
}
