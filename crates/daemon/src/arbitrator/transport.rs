// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport stage: dispatch queued operations to transporter workers

use super::{Arbitrator, TransportTask};
use crate::transporters::TransportAction;
use conveyor_core::{Clock, FileEvent};

impl<C: Clock> Arbitrator<C> {
    /// Per server: peek, obtain a worker slot, and only then take the item.
    /// With no slot available the item stays queued for a later tick.
    pub(crate) fn process_transport_queues(&mut self) {
        let servers: Vec<String> = self.transport_queues.keys().cloned().collect();
        for server in servers {
            let mut processed = 0;
            while processed < self.settings.queue_process_batch_size {
                let Some(front) =
                    self.transport_queues.get(&server).and_then(|queue| queue.front())
                else {
                    break;
                };

                let action = match front.event {
                    FileEvent::Created | FileEvent::Modified => TransportAction::AddModify,
                    // DELETE_OLD_FILE is a modify whose obsolete artifact
                    // still must go; it maps to a plain delete here.
                    FileEvent::Deleted | FileEvent::DeleteOldFile => TransportAction::Delete,
                };
                let dst = destination_path(front, &server, &self.working_dir);

                let max_queue = self.settings.max_transporter_queue_size;
                let cap = self.settings.max_simultaneous_transporters;
                let Some(pool) = self.pools.get_mut(&server) else { break };
                let Some(worker) = pool.acquire(max_queue, cap, &mut self.live_transporters)
                else {
                    tracing::debug!(server = %server, "no transporter available right now");
                    break;
                };

                let Some(task) =
                    self.transport_queues.get_mut(&server).and_then(|queue| queue.pop_front())
                else {
                    break;
                };
                tracing::info!(
                    file = %task.output_file.display(),
                    server = %server,
                    dst = %dst,
                    "transport queue -> transporter"
                );
                worker.sync_file(task.output_file.clone(), dst, action, task);
                processed += 1;
            }
        }
    }
}

/// Destination-relative path for an output file: the working directory
/// (including a per-server working subtree) or the source's scan path is
/// stripped, and the rule's per-destination parent path is prepended.
fn destination_path(task: &TransportTask, server: &str, working_dir: &std::path::Path) -> String {
    let mut prefixes = Vec::new();
    if let Some(server) = &task.processed_for {
        prefixes.push(working_dir.join(server).to_string_lossy().into_owned());
    }
    prefixes.push(working_dir.to_string_lossy().into_owned());
    prefixes.push(task.rule.source.scan_path.to_string_lossy().into_owned());

    let mut rel = task.output_file.to_string_lossy().into_owned();
    for prefix in prefixes {
        if !prefix.is_empty() && rel.starts_with(&prefix) {
            rel = rel[prefix.len()..].to_string();
        }
    }
    let rel = rel.trim_start_matches('/');

    match task.rule.rule.destinations.get(server).and_then(|d| d.path.as_deref()) {
        Some(parent) if !parent.is_empty() => {
            format!("{}/{}", parent.trim_matches('/'), rel)
        }
        _ => rel.to_string(),
    }
}
