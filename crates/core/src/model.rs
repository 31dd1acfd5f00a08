// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configured sources, destination servers and sync rules

use crate::filter::FilterConditions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A logical input root being watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Identifier, `[A-Za-z0-9_-]+`.
    pub name: String,
    /// Absolute directory to watch; must exist at startup.
    pub scan_path: PathBuf,
    pub document_root: Option<PathBuf>,
    /// URL path fragment beginning and ending with `/`.
    pub base_path: Option<String>,
}

/// A destination server, immutable after configuration load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    /// Transporter-kind identifier resolved against the transporter registry.
    pub transporter: String,
    /// 0 means unlimited.
    pub max_connections: u32,
    /// Opaque transporter settings (child element text per tag).
    pub settings: BTreeMap<String, String>,
}

/// Per-destination overrides within a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Parent path prepended to the destination-relative path.
    pub path: Option<String>,
}

/// A sync rule: which files of a source go where, after which processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Name of the source this rule applies to.
    pub source: String,
    pub label: String,
    pub filter: Option<FilterConditions>,
    /// Ordered processor identifiers, e.g. `unique_filename.Md5`.
    pub processor_chain: Option<Vec<String>>,
    /// Destination server name to per-destination settings.
    pub destinations: BTreeMap<String, Destination>,
    /// Source-side deletion after a completed sync: `None` leaves the source
    /// alone, `0` deletes immediately, `n > 0` schedules deletion n seconds
    /// after completion.
    pub deletion_delay: Option<u64>,
}
