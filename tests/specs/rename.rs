// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rename-on-modify: a chain that renames must leave exactly one artifact

use crate::support::{drive_until_idle, listing, World};
use conveyor_core::FileEvent;

const HASHED_RULE: &str = r#"
    <rule for="main" label="Cache-busted images">
      <filter><extensions>gif</extensions></filter>
      <processorChain>
        <processor name="unique_filename.Md5" />
      </processorChain>
      <destinations><destination server="cdn" /></destinations>
    </rule>"#;

#[tokio::test]
async fn modify_with_a_new_basename_replaces_the_old_artifact() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], HASHED_RULE, false));
    let file = world.write_src("logo.gif", "first-content");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;

    let before = listing(&world.dst("cdn"));
    assert_eq!(before.len(), 1);
    let first_basename = before[0].clone();
    assert!(first_basename.starts_with("logo_") && first_basename.ends_with(".gif"));

    std::fs::write(&file, "second-content").expect("modify source");
    arb.monitor_callback(file.clone(), FileEvent::Modified);
    drive_until_idle(&mut arb).await;

    let after = listing(&world.dst("cdn"));
    assert_eq!(after.len(), 1, "the old artifact must be deleted on the destination");
    assert_ne!(after[0], first_basename);

    let row = arb.index().lookup(&file.to_string_lossy(), "cdn").expect("lookup").expect("row");
    assert_eq!(row.transported_file_basename, after[0]);
    assert_eq!(row.url, format!("http://cdn.test/{}", after[0]));
    assert_eq!(arb.index().count().expect("count"), 1, "exactly one row per (input, server)");
    assert_eq!(arb.files_in_pipeline_count(), 0);
}

#[tokio::test]
async fn modify_with_an_unchanged_basename_updates_in_place() {
    let world = World::new();
    let rule = r#"
        <rule for="main" label="Underscored">
          <filter><extensions>txt</extensions></filter>
          <processorChain>
            <processor name="filename.SpacesToUnderscores" />
          </processorChain>
          <destinations><destination server="cdn" /></destinations>
        </rule>"#;
    let mut arb = world.arbitrator(&world.config_xml(&["cdn"], rule, false));
    let file = world.write_src("my note.txt", "v1");

    arb.monitor_callback(file.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;
    assert_eq!(listing(&world.dst("cdn")), vec!["my_note.txt"]);

    std::fs::write(&file, "v2").expect("modify source");
    arb.monitor_callback(file.clone(), FileEvent::Modified);
    drive_until_idle(&mut arb).await;

    assert_eq!(listing(&world.dst("cdn")), vec!["my_note.txt"]);
    let stored = std::fs::read_to_string(world.dst("cdn").join("my_note.txt")).expect("read");
    assert_eq!(stored, "v2");
    assert_eq!(arb.index().count().expect("count"), 1);
}
