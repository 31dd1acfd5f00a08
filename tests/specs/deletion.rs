// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deletion-delay specs: daemon-issued versus external source deletions

use crate::support::{drive_until, drive_until_idle, listing, World};
use conveyor_core::FileEvent;
use std::time::Duration;

const DELAYED_RULE: &str = r#"
    <rule for="main" label="Uploads">
      <filter><extensions>jpg</extensions></filter>
      <destinations><destination server="cdn" /></destinations>
      <deletionDelay>60</deletionDelay>
    </rule>"#;

#[tokio::test]
async fn external_delete_inside_the_window_unschedules_and_syncs() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], DELAYED_RULE, false));
    let file = world.write_src("x.jpg", "jpg-bytes");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;
    assert_eq!(arb.scheduled_deletions().len(), 1);
    assert_eq!(listing(&world.dst("cdn")), vec!["x.jpg"]);

    // Ten seconds in, something else deletes the source.
    world.clock.advance(Duration::from_secs(10));
    std::fs::remove_file(&file).expect("external delete");
    arb.monitor_callback(file.clone(), FileEvent::Deleted);
    drive_until_idle(&mut arb).await;

    assert!(arb.scheduled_deletions().is_empty(), "the pending deletion must be removed");
    assert!(listing(&world.dst("cdn")).is_empty(), "the deletion must propagate");
    assert_eq!(arb.index().count().expect("count"), 0);
}

#[tokio::test]
async fn daemon_issued_delete_after_the_window_is_not_propagated() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], DELAYED_RULE, false));
    let file = world.write_src("x.jpg", "jpg-bytes");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;
    assert!(file.exists());

    world.clock.advance(Duration::from_secs(61));
    drive_until(&mut arb, "the scheduled deletion", |a| a.scheduled_deletions().is_empty())
        .await;
    assert!(!file.exists(), "the daemon must delete the source after the delay");

    // The watcher will report that deletion; it must be swallowed.
    arb.monitor_callback(file.clone(), FileEvent::Deleted);
    drive_until_idle(&mut arb).await;
    assert_eq!(arb.index().count().expect("count"), 1, "the artifact stays published");
    assert_eq!(listing(&world.dst("cdn")), vec!["x.jpg"]);
}
