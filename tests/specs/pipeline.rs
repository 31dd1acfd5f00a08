// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core pipeline specs: coalescing, plain syncs, destination failures

use crate::support::{drive_until, drive_until_idle, listing, World};
use conveyor_core::FileEvent;

const PNG_RULE: &str = r#"
    <rule for="main" label="Images">
      <filter><extensions>png</extensions></filter>
      <destinations><destination server="cdn" /></destinations>
    </rule>"#;

#[tokio::test]
async fn created_file_is_synced_and_indexed() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], PNG_RULE, false));
    let file = world.write_src("a.png", "png-bytes");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;

    assert_eq!(listing(&world.dst("cdn")), vec!["a.png"]);
    let row = arb.index().lookup(&file.to_string_lossy(), "cdn").expect("lookup").expect("row");
    assert_eq!(row.url, "http://cdn.test/a.png");
    assert_eq!(arb.files_in_pipeline_count(), 0);
}

#[tokio::test]
async fn create_then_delete_before_any_sync_cancels_out() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], PNG_RULE, false));
    let file = world.write_src("a.png", "png-bytes");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    std::fs::remove_file(&file).expect("delete source");
    arb.monitor_callback(file, FileEvent::Deleted);

    arb.tick().expect("tick");
    assert_eq!(arb.pipeline_queue_size(), 0, "the events must cancel in the pipeline queue");
    drive_until_idle(&mut arb).await;

    assert!(listing(&world.dst("cdn")).is_empty(), "no transporter operation may happen");
    assert_eq!(arb.index().count().expect("count"), 0);
}

#[tokio::test]
async fn unreachable_destination_parks_the_file_and_recovers() {
    let world = World::new();
    let rule = r#"
        <rule for="main" label="Styles">
          <filter><extensions>css</extensions></filter>
          <destinations><destination server="cdn" path="assets" /></destinations>
        </rule>"#;
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], rule, false));
    let file = world.write_src("b.css", "body {}");

    // Break the destination: a regular file sits where the per-rule parent
    // directory must be created.
    std::fs::write(world.dst("cdn").join("assets"), "blocker").expect("block destination");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    for _ in 0..20 {
        arb.tick().expect("tick");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(arb.index().count().expect("count"), 0, "no row may appear while failing");
    assert!(
        arb.pipeline_queue_size() + arb.failed_files_count() + arb.files_in_pipeline_count() >= 1,
        "the item must stay tracked somewhere durable"
    );

    std::fs::remove_file(world.dst("cdn").join("assets")).expect("unblock destination");
    drive_until(&mut arb, "the sync to complete", |a| {
        a.is_idle() && a.index().count().unwrap_or_default() == 1
    })
    .await;

    assert!(world.dst("cdn").join("assets/b.css").exists());
    let row = arb.index().lookup(&file.to_string_lossy(), "cdn").expect("lookup").expect("row");
    assert_eq!(row.url, "http://cdn.test/assets/b.css");
}

#[tokio::test]
async fn multiple_destinations_each_get_the_artifact() {
    let world = World::new();
    let rule = r#"
        <rule for="main" label="Images">
          <filter><extensions>png</extensions></filter>
          <destinations>
            <destination server="alpha" />
            <destination server="beta" />
          </destinations>
        </rule>"#;
    let mut arb = world.arbitrator(&world.config_xml(&["alpha", "beta"], rule, false));
    let file = world.write_src("a.png", "png-bytes");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;

    assert_eq!(listing(&world.dst("alpha")), vec!["a.png"]);
    assert_eq!(listing(&world.dst("beta")), vec!["a.png"]);
    let rows = arb.index().rows_for(&file.to_string_lossy()).expect("rows");
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].url, rows[1].url);
}
