// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule filters: match file paths on path fragments, extensions, ignored
//! directories, a regular expression and file size

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("at least one of the paths or extensions conditions must be set")]
    MissingCondition,
    #[error("invalid paths condition: {0:?}")]
    InvalidPathsCondition(String),
    #[error("invalid extensions condition: {0:?}")]
    InvalidExtensionsCondition(String),
    #[error("invalid ignoredDirs condition: {0:?}")]
    InvalidIgnoredDirsCondition(String),
    #[error("invalid pattern condition: {0}")]
    InvalidPatternCondition(String),
    #[error("invalid size condition: {0}")]
    InvalidSizeCondition(String),
}

/// Whether the size threshold is a lower or an upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBound {
    Minimum,
    Maximum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeCondition {
    pub condition_type: SizeBound,
    /// Threshold in bytes; comparisons are strict.
    pub threshold: u64,
}

/// Raw filter conditions as configured. All fields optional; at least one of
/// `paths`/`extensions` is required. List-valued conditions are
/// colon-separated strings, as in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConditions {
    pub paths: Option<String>,
    pub extensions: Option<String>,
    pub ignored_dirs: Option<String>,
    pub pattern: Option<String>,
    pub size: Option<SizeCondition>,
}

// Characters that cannot appear in a path fragment of a filter condition.
// Filepaths valid on Windows are valid anywhere, so the Windows set is used.
const FORBIDDEN_PATHS: &[char] = &['*', '"', '[', ']', ':', ';', '|', '=', ',', '<', '>'];
const FORBIDDEN_EXTENSIONS: &[char] =
    &['*', '"', '[', ']', ':', ';', '|', '=', ',', '<', '>', '/', '\\', '.'];
const FORBIDDEN_DIRS: &[char] =
    &['*', '"', '[', ']', ':', ';', '|', '=', ',', '<', '>', '/', '\\'];

/// Validate a colon-separated list: fragments must be non-empty and free of
/// the forbidden characters (the colon itself is the separator).
fn validate_list(value: &str, forbidden: &[char]) -> bool {
    !value.is_empty() && value.split(':').all(|f| !f.is_empty() && !f.contains(forbidden))
}

/// Validate a colon-separated directory-name list. Used both for the
/// ignoredDirs filter condition and the global sources attribute.
pub fn is_valid_ignored_dirs(value: &str) -> bool {
    validate_list(value, FORBIDDEN_DIRS)
}

/// A compiled filter, ready to match paths.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Path fragments with a trailing `/` appended.
    paths: Vec<String>,
    /// Lowercased extensions without the dot.
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
    pattern: Option<Regex>,
    size: Option<SizeCondition>,
}

impl Filter {
    /// Validate and compile the given conditions.
    pub fn new(conditions: &FilterConditions) -> Result<Self, FilterError> {
        if conditions.paths.is_none() && conditions.extensions.is_none() {
            return Err(FilterError::MissingCondition);
        }

        let mut paths = Vec::new();
        if let Some(raw) = &conditions.paths {
            if !validate_list(raw, FORBIDDEN_PATHS) {
                return Err(FilterError::InvalidPathsCondition(raw.clone()));
            }
            paths = raw.split(':').map(|p| format!("{}/", p.trim_end_matches('/'))).collect();
        }

        let mut extensions = Vec::new();
        if let Some(raw) = &conditions.extensions {
            if !validate_list(raw, FORBIDDEN_EXTENSIONS) {
                return Err(FilterError::InvalidExtensionsCondition(raw.clone()));
            }
            extensions = raw.split(':').map(|e| e.to_ascii_lowercase()).collect();
        }

        let mut ignored_dirs = Vec::new();
        if let Some(raw) = &conditions.ignored_dirs {
            if !validate_list(raw, FORBIDDEN_DIRS) {
                return Err(FilterError::InvalidIgnoredDirsCondition(raw.clone()));
            }
            ignored_dirs = raw.split(':').map(str::to_string).collect();
        }

        let pattern = match &conditions.pattern {
            // Anchor at the start: the pattern must match the path from its
            // beginning, not merely occur somewhere inside it.
            Some(raw) => Some(
                Regex::new(&format!(r"\A(?:{})", raw))
                    .map_err(|e| FilterError::InvalidPatternCondition(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self { paths, extensions, ignored_dirs, pattern, size: conditions.size })
    }

    /// Check whether `path` matches, statting the file for size conditions.
    pub fn matches(&self, path: &Path, file_is_deleted: bool) -> bool {
        self.matches_with(path, file_is_deleted, |p| std::fs::metadata(p).map(|m| m.len()).ok())
    }

    /// Check whether `path` matches, with an injectable size lookup.
    ///
    /// Conditions are evaluated in an order optimized for early exit:
    /// paths, extensions, ignored dirs, pattern, size. The size condition is
    /// skipped entirely for deleted files, which can no longer be statted.
    pub fn matches_with(
        &self,
        path: &Path,
        file_is_deleted: bool,
        size_of: impl FnOnce(&Path) -> Option<u64>,
    ) -> bool {
        let path_str = path.to_string_lossy();

        if !self.paths.is_empty() {
            let dir = match path.parent() {
                Some(d) => format!("{}/", d.to_string_lossy().trim_end_matches('/')),
                None => return false,
            };
            if !self.paths.iter().any(|p| dir.contains(p.as_str())) {
                return false;
            }
        }

        if !self.extensions.is_empty() {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if !self.extensions.iter().any(|e| *e == ext) {
                return false;
            }
        }

        if !self.ignored_dirs.is_empty() {
            let mut segments = path.components().filter_map(|c| match c {
                std::path::Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            });
            if segments.any(|s| self.ignored_dirs.iter().any(|d| *d == s)) {
                return false;
            }
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&path_str) {
                return false;
            }
        }

        if let Some(size) = self.size {
            if !file_is_deleted {
                let actual = match size_of(path) {
                    Some(s) => s,
                    None => return false,
                };
                let ok = match size.condition_type {
                    SizeBound::Minimum => size.threshold < actual,
                    SizeBound::Maximum => size.threshold > actual,
                };
                if !ok {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
