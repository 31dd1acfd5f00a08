// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery specs: durable state picks up where the last run stopped

use crate::support::{drive_until_idle, listing, World};
use conveyor_core::FileEvent;

const PNG_RULE: &str = r#"
    <rule for="main" label="Images">
      <filter><extensions>png</extensions></filter>
      <destinations><destination server="cdn" /></destinations>
    </rule>"#;

#[tokio::test]
async fn items_in_flight_at_a_crash_are_replayed_once() {
    let world = World::new();
    let xml = world.config_xml(&["cdn"], PNG_RULE, false);
    let file = world.write_src("p.png", "png-bytes");

    // First run: the item enters the pipeline (one tick is enough to move
    // it onto the durable files-in-pipeline list), then the daemon "dies"
    // before the sync is recorded.
    {
        let mut arb = world.arbitrator(&xml);
        arb.monitor_callback(file.clone(), FileEvent::Created);
        arb.tick().expect("tick");
        assert_eq!(arb.files_in_pipeline_count(), 1);
        // Dropped without shutdown: durable state stays as-is.
    }

    // Second run: startup recovery replays the item and the sync completes
    // exactly once.
    let mut arb = world.arbitrator(&xml);
    arb.start().expect("start");
    drive_until_idle(&mut arb).await;

    assert_eq!(listing(&world.dst("cdn")), vec!["p.png"]);
    assert_eq!(arb.index().count().expect("count"), 1);
    assert_eq!(arb.files_in_pipeline_count(), 0);
    assert_eq!(arb.failed_files_count(), 0);
    arb.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_durable_state_intact() {
    let world = World::new();
    let xml = world.config_xml(&["cdn"], PNG_RULE, false);
    let file = world.write_src("q.png", "png-bytes");

    {
        let mut arb = world.arbitrator(&xml);
        arb.monitor_callback(file.clone(), FileEvent::Created);
        arb.tick().expect("tick");
        assert!(arb.pipeline_queue_size() + arb.files_in_pipeline_count() >= 1);
        arb.shutdown().await;
    }

    // The queue contents survived the orderly shutdown and drain on the
    // next run.
    let mut arb = world.arbitrator(&xml);
    arb.start().expect("start");
    drive_until_idle(&mut arb).await;
    assert_eq!(arb.index().count().expect("count"), 1);
    arb.shutdown().await;
}
