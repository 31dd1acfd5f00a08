// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local storage that symlinks when it can and copies when it must
//!
//! Serves the "public-accessible location on the same machine" case: when
//! the source file lives inside one of the `symlinkWithin` roots (derived
//! from the configured sources' scan paths), a symlink is enough for a web
//! server to pick it up; files from elsewhere (processor output under the
//! working directory) are copied, since their origin is transient.

use super::{Storage, TransporterError};
use conveyor_core::Server;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct SymlinkOrCopyStorage {
    location: PathBuf,
    base_url: String,
    symlink_within: Vec<PathBuf>,
}

impl SymlinkOrCopyStorage {
    pub fn from_server(server: &Server) -> Result<Self, TransporterError> {
        let location = server.settings.get("location").ok_or(TransporterError::MissingSetting {
            server: server.name.clone(),
            setting: "location",
        })?;
        let base_url = server.settings.get("url").ok_or(TransporterError::MissingSetting {
            server: server.name.clone(),
            setting: "url",
        })?;
        let symlink_within = server
            .settings
            .get("symlinkWithin")
            .map(|raw| raw.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();

        let location = PathBuf::from(location);
        std::fs::create_dir_all(&location).map_err(|e| {
            TransporterError::Connection(format!(
                "cannot use location '{}': {}",
                location.display(),
                e
            ))
        })?;

        Ok(Self { location, base_url: base_url.clone(), symlink_within })
    }

    fn full_path(&self, dst: &str) -> PathBuf {
        self.location.join(dst.trim_start_matches('/'))
    }
}

impl Storage for SymlinkOrCopyStorage {
    fn exists(&mut self, dst: &str) -> Result<bool, TransporterError> {
        // symlink_metadata so a dangling symlink still counts as present.
        Ok(std::fs::symlink_metadata(self.full_path(dst)).is_ok())
    }

    fn save(&mut self, src: &Path, dst: &str) -> Result<String, TransporterError> {
        let full = self.full_path(dst);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut symlinked = false;
        #[cfg(unix)]
        if self.symlink_within.iter().any(|root| src.starts_with(root)) {
            std::os::unix::fs::symlink(src, &full)?;
            symlinked = true;
        }
        if !symlinked {
            std::fs::copy(src, &full)?;
        }

        Ok(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            dst.trim_start_matches('/')
        ))
    }

    fn delete(&mut self, dst: &str) -> Result<(), TransporterError> {
        let full = self.full_path(dst);
        if std::fs::symlink_metadata(&full).is_ok() {
            std::fs::remove_file(&full)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "symlink_or_copy_tests.rs"]
mod tests;
