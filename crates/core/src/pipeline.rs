// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline work units and their identity keys

use crate::event::FileEvent;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One unit of work tracked end-to-end through the pipeline.
///
/// Identity in the pipeline queue is the input path alone; successive events
/// for the same path are coalesced into the existing entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineItem {
    pub input_file: PathBuf,
    pub event: FileEvent,
}

impl PipelineItem {
    pub fn new(input_file: impl Into<PathBuf>, event: FileEvent) -> Self {
        Self { input_file: input_file.into(), event }
    }

    /// Queue key: the input path.
    pub fn key(&self) -> String {
        self.input_file.to_string_lossy().into_owned()
    }
}

/// Identity of one rule application to one pipeline item.
///
/// Keys the remaining-transporters map: the set of destinations still owed
/// completion for (input path, event) under a given rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub input_file: PathBuf,
    pub event: FileEvent,
    pub source: String,
    pub label: String,
}

impl PipelineKey {
    pub fn new(input_file: &Path, event: FileEvent, source: &str, label: &str) -> Self {
        Self {
            input_file: input_file.to_path_buf(),
            event,
            source: source.to_string(),
            label: label.to_string(),
        }
    }
}
