// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-server specialization: chains whose output depends on the destination

use crate::support::{drive_until, drive_until_idle, World};
use conveyor_core::FileEvent;

const SITE_RULES: &str = r#"
    <rule for="main" label="Images">
      <filter><extensions>png</extensions></filter>
      <destinations>
        <destination server="alpha" />
        <destination server="beta" />
      </destinations>
    </rule>
    <rule for="main" label="Stylesheets">
      <filter><extensions>css</extensions></filter>
      <processorChain>
        <processor name="link_updater.CssUrlUpdater" />
      </processorChain>
      <destinations>
        <destination server="alpha" />
        <destination server="beta" />
      </destinations>
    </rule>"#;

#[tokio::test]
async fn chain_runs_once_per_destination_with_distinct_outputs() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["alpha", "beta"], SITE_RULES, true));

    // The referenced image syncs first, to both destinations.
    let image = world.write_src("logo.png", "png-bytes");
    arb.monitor_callback(image.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;

    let css = world.write_src("style.css", "body { background: url(logo.png); }");
    arb.monitor_callback(css.clone(), FileEvent::Created);
    drive_until_idle(&mut arb).await;

    // One run per destination, each rewritten against that server's URLs.
    let on_alpha =
        std::fs::read_to_string(world.dst("alpha").join("style.css")).expect("alpha artifact");
    let on_beta =
        std::fs::read_to_string(world.dst("beta").join("style.css")).expect("beta artifact");
    assert_eq!(on_alpha, "body { background: url(http://alpha.test/logo.png); }");
    assert_eq!(on_beta, "body { background: url(http://beta.test/logo.png); }");

    let rows = arb.index().rows_for(&css.to_string_lossy()).expect("rows");
    assert_eq!(rows.len(), 2, "exactly one row per destination");
    assert_ne!(rows[0].url, rows[1].url);
    assert_eq!(arb.files_in_pipeline_count(), 0);
}

#[tokio::test]
async fn stylesheet_waits_for_its_references_to_sync() {
    let world = World::new();
    let mut arb = world.arbitrator(&world.config_xml(&["alpha", "beta"], SITE_RULES, true));

    // Both files exist, but only the stylesheet is announced: its reference
    // is not in the index yet, so it parks and retries.
    let image = world.write_src("logo.png", "png-bytes");
    let css = world.write_src("style.css", "body { background: url(logo.png); }");
    arb.monitor_callback(css.clone(), FileEvent::Created);
    for _ in 0..20 {
        arb.tick().expect("tick");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(arb.index().rows_for(&css.to_string_lossy()).expect("rows").is_empty());

    arb.monitor_callback(image, FileEvent::Created);
    drive_until(&mut arb, "the stylesheet to sync everywhere", |a| {
        a.is_idle()
            && a.index().rows_for(&css.to_string_lossy()).map(|r| r.len()).unwrap_or(0) == 2
    })
    .await;
}
