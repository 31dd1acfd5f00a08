// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rewrite `url(...)` references in CSS to their synced destination URLs
//!
//! A stylesheet can only be published once every file it references has been
//! synced; until then the processor raises a requeue request and the
//! arbitrator retries the stylesheet later. The rewritten URLs differ per
//! destination, so chains containing this processor run once per server.

use super::{ProcessContext, Processor, ProcessorError};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

const URL_PATTERN: &str = r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#;

pub struct CssUrlUpdater;

impl Processor for CssUrlUpdater {
    fn name(&self) -> &'static str {
        "link_updater.CssUrlUpdater"
    }

    fn valid_extensions(&self) -> &'static [&'static str] {
        &["css"]
    }

    fn different_per_server(&self) -> bool {
        true
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        let document_root = match (ctx.document_root, ctx.base_path) {
            (Some(root), Some(_)) => root,
            _ => return Err(ProcessorError::DocumentRootAndBasePathRequired),
        };

        let css = std::fs::read_to_string(ctx.input_file)?;
        let pattern =
            Regex::new(URL_PATTERN).map_err(|e| ProcessorError::Failed(e.to_string()))?;

        // First pass: resolve every local reference and require it synced.
        let mut replacements: HashMap<String, String> = HashMap::new();
        for captures in pattern.captures_iter(&css) {
            let reference = match captures.get(1) {
                Some(m) => m.as_str().trim(),
                None => continue,
            };
            if is_external(reference) || replacements.contains_key(reference) {
                continue;
            }
            let resolved = resolve_reference(reference, ctx.original_file, document_root);
            if !resolved.exists() {
                // A broken reference must not keep the stylesheet from ever
                // passing through this processor.
                continue;
            }
            let resolved_str = resolved.to_string_lossy().into_owned();
            match conveyor_storage::index::lookup_url(
                ctx.synced_files_db,
                &resolved_str,
                ctx.process_for_server,
            ) {
                Ok(Some(url)) => {
                    replacements.insert(reference.to_string(), url);
                }
                Ok(None) => {
                    return Err(ProcessorError::Requeue(format!(
                        "'{}' has not been synced yet",
                        resolved_str
                    )));
                }
                Err(e) => return Err(ProcessorError::Failed(e.to_string())),
            }
        }

        // Second pass: rewrite.
        let rewritten = pattern.replace_all(&css, |captures: &regex::Captures<'_>| {
            let reference = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            match replacements.get(reference) {
                Some(url) => format!("url({})", url),
                None => captures
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        });

        let output = ctx.output_path(&ctx.basename())?;
        std::fs::write(&output, rewritten.as_bytes())?;
        Ok(output)
    }
}

fn is_external(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("data:")
        || reference.starts_with("//")
}

/// Map a CSS reference to the source file it points at: root-relative URLs
/// resolve under the document root, relative URLs against the stylesheet's
/// own directory.
fn resolve_reference(reference: &str, original_file: &Path, document_root: &Path) -> PathBuf {
    let joined = if let Some(rooted) = reference.strip_prefix('/') {
        document_root.join(rooted)
    } else {
        original_file.parent().unwrap_or(Path::new("")).join(reference)
    };
    normalize(&joined)
}

/// Resolve `.` and `..` components lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
#[path = "link_updater_tests.rs"]
mod tests;
