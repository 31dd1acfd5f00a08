// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processors: per-file transformations run before transport
//!
//! A processor reads its input file and writes a new file into the working
//! directory, mirroring the source-relative subdirectory. The default output
//! basename equals the input basename; processors that rename produce the
//! "transported basename" recorded in the synced-files index.

pub mod chain;
pub mod filename;
pub mod image_optimizer;
pub mod link_updater;
pub mod unique_filename;

pub use chain::run_chain;

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// A prerequisite is not met yet; the arbitrator parks the file on the
    /// failed-files list and retries later.
    #[error("requeue requested: {0}")]
    Requeue(String),
    /// The processor needs the source's document root and base path, which
    /// are not configured. Skipped non-fatally.
    #[error("document root and base path are required")]
    DocumentRootAndBasePathRequired,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

/// Everything a processor gets to see about the file it transforms.
pub struct ProcessContext<'a> {
    /// The file to read: the original, or a previous processor's output.
    pub input_file: &'a Path,
    /// The pristine source path (never inside the working directory).
    pub original_file: &'a Path,
    pub document_root: Option<&'a Path>,
    pub base_path: Option<&'a str>,
    /// Set when the chain runs once per destination server.
    pub process_for_server: Option<&'a str>,
    pub working_dir: &'a Path,
    /// Path of the synced-files database, for processors that resolve
    /// references to other synced files.
    pub synced_files_db: &'a Path,
}

impl ProcessContext<'_> {
    /// Basename of the current input file.
    pub fn basename(&self) -> String {
        self.input_file
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// (stem, extension-with-dot) of the current input file.
    pub fn name_parts(&self) -> (String, String) {
        let stem = self
            .input_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .input_file
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }

    /// Output path for `basename` under the working directory, mirroring the
    /// input's source-relative subdirectory. Creates the directory tree.
    pub fn output_path(&self, basename: &str) -> Result<PathBuf, ProcessorError> {
        let dir = self.working_dir.join(relative_dir(self.input_file, self.working_dir));
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(basename))
    }
}

/// The directory of `path`, relative: the working-directory prefix is
/// stripped when present, and the root is dropped otherwise, so the result
/// can be joined below the working directory.
fn relative_dir(path: &Path, working_dir: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or(Path::new(""));
    let dir = dir.strip_prefix(working_dir).unwrap_or(dir);
    dir.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extensions (without dot, lowercase) this processor accepts; empty
    /// means all. A file outside the set is skipped, not failed.
    fn valid_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    /// True when the output depends on the destination server, making the
    /// arbitrator run the chain once per destination.
    fn different_per_server(&self) -> bool {
        false
    }

    /// Transform the input and return the output path.
    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError>;
}

/// Whether this processor would accept the given input file.
pub fn would_process(processor: &dyn Processor, input_file: &Path) -> bool {
    let valid = processor.valid_extensions();
    if valid.is_empty() {
        return true;
    }
    let ext = input_file
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    valid.iter().any(|v| *v == ext)
}

static SPACES_TO_UNDERSCORES: filename::SpacesToUnderscores = filename::SpacesToUnderscores;
static SPACES_TO_DASHES: filename::SpacesToDashes = filename::SpacesToDashes;
static IMAGE_OPTIMIZER_KEEP_FILENAME: image_optimizer::KeepFilename =
    image_optimizer::KeepFilename;
static UNIQUE_FILENAME_MD5: unique_filename::Md5 = unique_filename::Md5;
static CSS_URL_UPDATER: link_updater::CssUrlUpdater = link_updater::CssUrlUpdater;

/// Resolve a processor identifier from the static registry. An unknown name
/// in the configuration is a fatal startup error.
pub fn lookup(name: &str) -> Option<&'static dyn Processor> {
    match name {
        "filename.SpacesToUnderscores" => Some(&SPACES_TO_UNDERSCORES),
        "filename.SpacesToDashes" => Some(&SPACES_TO_DASHES),
        "image_optimizer.KeepFilename" => Some(&IMAGE_OPTIMIZER_KEEP_FILENAME),
        "unique_filename.Md5" => Some(&UNIQUE_FILENAME_MD5),
        "link_updater.CssUrlUpdater" => Some(&CSS_URL_UPDATER),
        _ => None,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
