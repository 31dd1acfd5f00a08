// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DB stage: synced-files bookkeeping and pipeline-item completion
//!
//! This is where the rename-on-modify dance lives: when a modify produced a
//! different transported basename, the row is updated and a DELETE_OLD_FILE
//! pseudo-event jumps that server's transport queue so the obsolete artifact
//! is removed before anything else happens on that destination. The
//! pseudo-event flows back here, turns into MODIFIED again, and only then
//! counts as that server's completion.

use super::{Arbitrator, ArbitratorError, DbTask, TransportTask};
use conveyor_core::{Clock, FileEvent, PipelineItem};
use conveyor_storage::StorageError;
use std::path::Path;

impl<C: Clock> Arbitrator<C> {
    pub(crate) fn process_db_queue(&mut self) -> Result<(), ArbitratorError> {
        let mut processed = 0;
        while processed < self.settings.queue_process_batch_size {
            let Some(task) = self.db_queue.pop_front() else { break };
            self.apply_db_task(task)?;
            processed += 1;
        }
        Ok(())
    }

    fn apply_db_task(&mut self, task: DbTask) -> Result<(), ArbitratorError> {
        let input_str = task.input_file.to_string_lossy().into_owned();
        let basename = task
            .output_file
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let url = task.url.clone().unwrap_or_default();

        let mut event = task.event;
        let mut remove_server = true;

        match event {
            FileEvent::Created => {
                match self.index.record(&input_str, &basename, &url, &task.server) {
                    // Another delivery path already inserted the row; the
                    // artifact is on the destination either way.
                    Err(StorageError::AlreadyExists) => {
                        tracing::error!(
                            file = %input_str,
                            server = %task.server,
                            "duplicate synced-files row, continuing"
                        );
                    }
                    other => other?,
                }
            }
            FileEvent::Modified => {
                if let Some(previous) = self.index.lookup(&input_str, &task.server)? {
                    self.index.update(&input_str, &task.server, &basename, &url)?;
                    if previous.transported_file_basename != basename {
                        // The old artifact still sits on the destination
                        // under its old name. Its deletion must precede any
                        // later operation on this destination's queue, and
                        // this server's completion waits for it.
                        remove_server = false;
                        let fake_output = task
                            .input_file
                            .parent()
                            .unwrap_or(Path::new(""))
                            .join(&previous.transported_file_basename);
                        if let Some(queue) = self.transport_queues.get_mut(&task.server) {
                            queue.push_front(TransportTask {
                                input_file: task.input_file.clone(),
                                event: FileEvent::DeleteOldFile,
                                rule: task.rule.clone(),
                                processed_for: None,
                                output_file: fake_output,
                            });
                            tracing::info!(
                                file = %input_str,
                                server = %task.server,
                                old = %previous.transported_file_basename,
                                "db queue -> transport queue (jumped): delete the old artifact"
                            );
                        }
                    }
                } else {
                    match self.index.record(&input_str, &basename, &url, &task.server) {
                        Err(StorageError::AlreadyExists) => {
                            tracing::error!(
                                file = %input_str,
                                server = %task.server,
                                "duplicate synced-files row, continuing"
                            );
                        }
                        other => other?,
                    }
                }
            }
            FileEvent::Deleted => {
                self.index.delete(&input_str, &task.server)?;
            }
            FileEvent::DeleteOldFile => {
                // The old artifact is gone; this was really a modify.
                event = FileEvent::Modified;
            }
        }

        tracing::debug!(file = %input_str, url = %url, "db queue -> synced-files index");

        let key = task.rule.key_for(&task.input_file, event);
        if remove_server {
            if let Some(remaining) = self.remaining_transporters.get_mut(&key) {
                remaining.remove(&task.server);
            }
        }
        if self.remaining_transporters.get(&key).is_some_and(|s| s.is_empty()) {
            self.remaining_transporters.remove(&key);
            self.complete_item(&task, event)?;
        }
        Ok(())
    }

    /// Every destination confirmed: clean up the chain output, apply the
    /// rule's source-deletion policy, and retire the item.
    fn complete_item(&mut self, task: &DbTask, event: FileEvent) -> Result<(), ArbitratorError> {
        if event.touches_source()
            && task.output_file != task.input_file
            && task.output_file.exists()
        {
            let _ = std::fs::remove_file(&task.output_file);
        }

        if event != FileEvent::Deleted {
            match task.rule.rule.deletion_delay {
                None => {
                    tracing::debug!(file = %task.input_file.display(), "leaving the source file in place");
                }
                Some(0) => {
                    if task.input_file.exists() {
                        std::fs::remove_file(&task.input_file)?;
                    }
                    tracing::warn!(
                        file = %task.input_file.display(),
                        rule = %task.rule.rule.label,
                        "deleted the source file"
                    );
                }
                Some(delay) => {
                    let at = self.clock.deadline_after_secs(delay);
                    self.files_to_delete.append(&(task.input_file.clone(), at))?;
                    tracing::warn!(
                        file = %task.input_file.display(),
                        delay,
                        rule = %task.rule.rule.label,
                        "scheduled the source file for deletion"
                    );
                }
            }
        }

        self.files_in_pipeline.remove(&PipelineItem::new(task.input_file.clone(), event))?;
        tracing::warn!(file = %task.input_file.display(), event = %event, "synced");
        Ok(())
    }
}
