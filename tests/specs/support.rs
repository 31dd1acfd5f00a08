// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the pipeline specs

use conveyor_config::Config;
use conveyor_core::{Clock, FakeClock, Settings};
use conveyor_daemon::Arbitrator;
use conveyor_daemon::Paths;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub struct World {
    pub root: TempDir,
    pub src: PathBuf,
    pub clock: FakeClock,
    pub paths: Paths,
}

impl World {
    pub fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let src = root.path().join("src");
        std::fs::create_dir_all(&src).expect("source dir");
        let state = root.path().join("state");
        std::fs::create_dir_all(&state).expect("state dir");
        let paths =
            Paths::new(root.path().join("config.xml"), state, root.path().join("work"));
        Self { root, src, clock: FakeClock::new(), paths }
    }

    /// Destination directory for a named server.
    pub fn dst(&self, server: &str) -> PathBuf {
        self.root.path().join(format!("dst-{}", server))
    }

    pub fn server_xml(&self, name: &str) -> String {
        format!(
            r#"<server name="{name}" transporter="symlink_or_copy">
                 <location>{location}</location>
                 <url>http://{name}.test/</url>
               </server>"#,
            name = name,
            location = self.dst(name).display(),
        )
    }

    /// A config with the given servers and rules over one source named
    /// `main`, optionally with a document root for link rewriting.
    pub fn config_xml(&self, servers: &[&str], rules: &str, with_site: bool) -> String {
        let site = if with_site {
            format!(r#" documentRoot="{}" basePath="/""#, self.src.display())
        } else {
            String::new()
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <sources ignoredDirs="CVS:.svn">
    <source name="main" scanPath="{scan}"{site} />
  </sources>
  <servers>
    {servers}
  </servers>
  <rules>
    {rules}
  </rules>
</config>"#,
            scan = self.src.display(),
            site = site,
            servers = servers.iter().map(|s| self.server_xml(s)).collect::<Vec<_>>().join("\n"),
            rules = rules,
        )
    }

    pub fn arbitrator(&self, xml: &str) -> Arbitrator<FakeClock> {
        let config = Config::parse(xml).expect("config parses");
        let mut settings = Settings::default();
        settings.max_simultaneous_processor_chains = 4;
        Arbitrator::new(config, &self.paths, settings, self.clock.clone())
            .expect("arbitrator initializes")
    }

    pub fn write_src(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.src.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("source subdir");
        }
        std::fs::write(&path, contents).expect("write source file");
        path
    }
}

pub async fn drive_until<C, F>(arb: &mut Arbitrator<C>, what: &str, mut done: F)
where
    C: Clock,
    F: FnMut(&Arbitrator<C>) -> bool,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    loop {
        arb.tick().expect("tick");
        if done(arb) {
            return;
        }
        assert!(std::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn drive_until_idle<C: Clock>(arb: &mut Arbitrator<C>) {
    drive_until(arb, "the pipeline to settle", |a| a.is_idle()).await;
}

/// Sorted file names in a destination directory.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|read| {
            read.flatten().map(|e| e.file_name().to_string_lossy().into_owned()).collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
