// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Front half of the tick: report draining, discover, pipeline and filter

use super::{Arbitrator, ArbitratorError, DbTask, ProcessTask, TransportTask};
use conveyor_core::{Clock, FileEvent, PipelineItem};
use std::collections::BTreeSet;
use std::path::Path;

impl<C: Clock> Arbitrator<C> {
    /// Collect completions from processor chains and transporters. This is
    /// the single point where worker results re-enter the arbitrator.
    pub(crate) fn drain_worker_reports(&mut self) {
        while let Ok(report) = self.chain_rx.try_recv() {
            self.chains_running = self.chains_running.saturating_sub(1);
            match report.result {
                Ok(output_file) => {
                    let destinations: Vec<String> = match &report.processed_for {
                        Some(server) => vec![server.clone()],
                        None => report.rule.rule.destinations.keys().cloned().collect(),
                    };
                    for server in destinations {
                        if let Some(queue) = self.transport_queues.get_mut(&server) {
                            queue.push_back(TransportTask {
                                input_file: report.input_file.clone(),
                                event: report.event,
                                rule: report.rule.clone(),
                                processed_for: report.processed_for.clone(),
                                output_file: output_file.clone(),
                            });
                        }
                    }
                    tracing::info!(
                        file = %report.input_file.display(),
                        "process queue -> transport queue"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        file = %report.input_file.display(),
                        error = %error,
                        "processor chain did not complete, queueing for retry"
                    );
                    self.retry_queue
                        .push_back(PipelineItem::new(report.input_file, report.event));
                }
            }
        }

        while let Ok(report) = self.transport_rx.try_recv() {
            let ctx = report.ctx;
            match report.result {
                Ok(url) => {
                    tracing::info!(
                        file = %ctx.input_file.display(),
                        server = %report.server,
                        "transport queue -> db queue"
                    );
                    self.db_queue.push_back(DbTask {
                        input_file: ctx.input_file,
                        event: ctx.event,
                        rule: ctx.rule,
                        output_file: ctx.output_file,
                        url,
                        server: report.server,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        file = %ctx.input_file.display(),
                        server = %report.server,
                        error = %error,
                        "transport failed, queueing for retry"
                    );
                    self.retry_queue.push_back(PipelineItem::new(ctx.input_file, ctx.event));
                }
            }
        }
    }

    /// Move monitor events into the discover queue; a dropped-events signal
    /// turns into a rescan request back to the monitor.
    pub(crate) fn drain_monitor_events(&mut self) {
        while let Ok(event) = self.monitor_rx.try_recv() {
            match (event.path, event.kind.to_file_event()) {
                (Some(path), Some(file_event)) => self.monitor_callback(path, file_event),
                _ => {
                    tracing::warn!(
                        root = %event.root.display(),
                        "monitor dropped events, requesting a rescan"
                    );
                    if let Some(monitor) = &self.monitor {
                        monitor.rescan(&event.root);
                    }
                }
            }
        }
    }

    /// Drain the discover queue fully: it is the only non-durable entry
    /// point, so its contents move to the persistent pipeline queue every
    /// tick, batch cap or not.
    pub(crate) fn process_discover_queue(&mut self) -> Result<(), ArbitratorError> {
        while let Some((input_file, event)) = self.discover_queue.pop_front() {
            tracing::info!(file = %input_file.display(), event = %event, "discover queue -> pipeline queue");
            self.enqueue_pipeline(&PipelineItem::new(input_file, event))?;
        }
        Ok(())
    }

    /// Admit queued files into the pipeline while there is room. The peek
    /// before the get makes the hand-off crash-safe: the item is on the
    /// files-in-pipeline list before it leaves the durable queue.
    pub(crate) fn process_pipeline_queue(&mut self) -> Result<(), ArbitratorError> {
        let mut processed = 0;
        while processed < self.settings.queue_process_batch_size
            && self.pipeline_queue.qsize() > 0
            && self.files_in_pipeline.len() < self.settings.max_files_in_pipeline
        {
            let item = self.pipeline_queue.peek()?;
            self.files_in_pipeline.append(&item)?;
            let item = self.pipeline_queue.get()?;
            tracing::info!(file = %item.input_file.display(), "pipeline queue -> filter queue");
            self.filter_queue.push_back(item);
            processed += 1;
        }
        Ok(())
    }

    pub(crate) fn process_filter_queue(&mut self) -> Result<(), ArbitratorError> {
        let mut processed = 0;
        while processed < self.settings.queue_process_batch_size {
            let Some(item) = self.filter_queue.pop_front() else { break };
            self.filter_one(item)?;
            processed += 1;
        }
        Ok(())
    }

    /// Match one pipeline item against the rules and fan it out to the
    /// process or transport queues.
    fn filter_one(&mut self, item: PipelineItem) -> Result<(), ArbitratorError> {
        // The file may be gone already, e.g. when it was restored from the
        // files-in-pipeline list after an interruption.
        if item.event.touches_source() && !item.input_file.exists() {
            self.files_in_pipeline.remove(&item)?;
            self.forget_remaining(&item.input_file, item.event);
            tracing::info!(
                file = %item.input_file.display(),
                "filtering: dropped, the file no longer exists"
            );
            return Ok(());
        }

        let deleted = item.event == FileEvent::Deleted;
        let rules = self.rules.clone();
        let mut match_found = false;

        for arb_rule in &rules {
            if !item.input_file.starts_with(&arb_rule.source.scan_path) {
                continue;
            }
            let matches = match &arb_rule.filter {
                None => true,
                Some(filter) => filter.matches(&item.input_file, deleted),
            };
            if !matches {
                continue;
            }
            match_found = true;
            tracing::info!(
                file = %item.input_file.display(),
                rule = %arb_rule.rule.label,
                source = %arb_rule.rule.source,
                "filtering: matched"
            );

            // A DELETED event for a rule with a deletion delay is normally
            // our own doing. The exception is a file still scheduled for
            // deletion: something else deleted it inside the window, and
            // that deletion must be synced.
            if deleted && arb_rule.rule.deletion_delay.is_some() {
                let scheduled = self
                    .files_to_delete
                    .iter()
                    .find(|(path, _)| *path == item.input_file)
                    .cloned();
                match scheduled {
                    Some(entry) => {
                        self.files_to_delete.remove(&entry)?;
                        tracing::warn!(
                            file = %item.input_file.display(),
                            "unscheduled for deletion"
                        );
                    }
                    None => {
                        self.files_in_pipeline.remove(&item)?;
                        self.forget_remaining(&item.input_file, item.event);
                        tracing::info!(
                            file = %item.input_file.display(),
                            "filtering: deletion performed by this daemon, not re-propagating"
                        );
                        return Ok(());
                    }
                }
            }

            let key = arb_rule.key_for(&item.input_file, item.event);
            let servers: BTreeSet<String> =
                arb_rule.rule.destinations.keys().cloned().collect();
            self.remaining_transporters.insert(key.clone(), servers.clone());

            if deleted {
                // The artifact to delete carries the *transported* basename,
                // which processing may have changed; the index knows it.
                let input_str = item.input_file.to_string_lossy();
                let basename = self
                    .index
                    .transported_basename(&input_str)?
                    .or_else(|| {
                        item.input_file
                            .file_name()
                            .map(|f| f.to_string_lossy().into_owned())
                    })
                    .unwrap_or_default();
                let fake_output =
                    item.input_file.parent().unwrap_or(Path::new("")).join(&basename);
                for server in &servers {
                    if let Some(queue) = self.transport_queues.get_mut(server) {
                        queue.push_back(TransportTask {
                            input_file: item.input_file.clone(),
                            event: item.event,
                            rule: arb_rule.clone(),
                            processed_for: None,
                            output_file: fake_output.clone(),
                        });
                    }
                    tracing::info!(
                        file = %item.input_file.display(),
                        server = %server,
                        rule = %arb_rule.rule.label,
                        "filtering: queued deletion"
                    );
                }
            } else if !arb_rule.chain.is_empty() {
                self.fan_out_to_process(&item, arb_rule, &key)?;
            } else {
                for server in &servers {
                    if let Some(queue) = self.transport_queues.get_mut(server) {
                        queue.push_back(TransportTask {
                            input_file: item.input_file.clone(),
                            event: item.event,
                            rule: arb_rule.clone(),
                            processed_for: None,
                            output_file: item.input_file.clone(),
                        });
                    }
                    tracing::info!(
                        file = %item.input_file.display(),
                        server = %server,
                        rule = %arb_rule.rule.label,
                        "filter queue -> transport queue"
                    );
                }
            }
        }

        if !match_found {
            self.files_in_pipeline.remove(&item)?;
            self.forget_remaining(&item.input_file, item.event);
            tracing::info!(
                file = %item.input_file.display(),
                "filtering: dropped, matches no rules"
            );
        }
        Ok(())
    }

    /// Queue chain runs: once globally, or once per destination when a
    /// processor's output differs per server. For per-server runs of a
    /// CREATED file, destinations that already hold it are skipped.
    fn fan_out_to_process(
        &mut self,
        item: &PipelineItem,
        arb_rule: &std::sync::Arc<super::ArbRule>,
        key: &conveyor_core::PipelineKey,
    ) -> Result<(), ArbitratorError> {
        let per_server = arb_rule.chain.iter().any(|p| {
            p.different_per_server() && crate::processors::would_process(*p, &item.input_file)
        });

        if per_server {
            let input_str = item.input_file.to_string_lossy();
            for server in arb_rule.rule.destinations.keys() {
                let already_synced = item.event == FileEvent::Created
                    && self.index.is_synced(&input_str, server)?;
                if already_synced {
                    if let Some(set) = self.remaining_transporters.get_mut(key) {
                        set.remove(server);
                    }
                    tracing::info!(
                        file = %item.input_file.display(),
                        server = %server,
                        rule = %arb_rule.rule.label,
                        "filtering: already synced to this server, not processing again"
                    );
                } else {
                    self.process_queue.push_back(ProcessTask {
                        input_file: item.input_file.clone(),
                        event: item.event,
                        rule: arb_rule.clone(),
                        processed_for: Some(server.clone()),
                    });
                    tracing::info!(
                        file = %item.input_file.display(),
                        server = %server,
                        rule = %arb_rule.rule.label,
                        "filter queue -> process queue (per server)"
                    );
                }
            }
            // Every destination may have been skipped; then the item is done.
            if self.remaining_transporters.get(key).is_some_and(BTreeSet::is_empty) {
                self.remaining_transporters.remove(key);
                self.files_in_pipeline.remove(item)?;
            }
        } else {
            self.process_queue.push_back(ProcessTask {
                input_file: item.input_file.clone(),
                event: item.event,
                rule: arb_rule.clone(),
                processed_for: None,
            });
            tracing::info!(
                file = %item.input_file.display(),
                rule = %arb_rule.rule.label,
                "filter queue -> process queue"
            );
        }
        Ok(())
    }
}
