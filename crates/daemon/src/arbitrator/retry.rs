// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled source deletions and the retry machinery

use super::{Arbitrator, ArbitratorError};
use conveyor_core::Clock;
use std::path::PathBuf;

impl<C: Clock> Arbitrator<C> {
    /// Delete source files whose deletion window has passed.
    pub(crate) fn process_files_to_delete(&mut self) -> Result<(), ArbitratorError> {
        if self.files_to_delete.is_empty() {
            return Ok(());
        }
        let now = self.clock.epoch_ms();
        let due: Vec<(PathBuf, u64)> = self
            .files_to_delete
            .iter()
            .filter(|(_, at)| *at <= now)
            .take(self.settings.queue_process_batch_size)
            .cloned()
            .collect();

        for entry in due {
            if entry.0.exists() {
                std::fs::remove_file(&entry.0)?;
            }
            self.files_to_delete.remove(&entry)?;
            tracing::warn!(
                file = %entry.0.display(),
                overdue_ms = now.saturating_sub(entry.1),
                "deleted a file that was scheduled for deletion"
            );
        }
        Ok(())
    }

    /// Park retryable failures on the durable failed-files list. An item
    /// already awaiting retry (parked, or back in the pipeline queue) is not
    /// parked twice — per-server chains can fail several times for the same
    /// file.
    pub(crate) fn process_retry_queue(&mut self) -> Result<(), ArbitratorError> {
        let mut processed = 0;
        while processed < self.settings.queue_process_batch_size {
            let Some(item) = self.retry_queue.pop_front() else { break };
            let already_parked =
                self.failed_files.contains(&item) || self.pipeline_queue.contains(&item)?;
            if already_parked {
                tracing::warn!(
                    file = %item.input_file.display(),
                    "retry queue: file is already awaiting retry"
                );
            } else {
                self.failed_files.append(&item)?;
                tracing::warn!(
                    file = %item.input_file.display(),
                    "retry queue -> failed-files list, retrying later"
                );
            }
            self.files_in_pipeline.remove(&item)?;
            self.forget_remaining(&item.input_file, item.event);
            processed += 1;
        }
        Ok(())
    }

    /// Move failed files back into the pipeline queue, either because the
    /// retry interval elapsed or because the pipeline has drained and there
    /// is nothing better to do.
    pub(crate) fn allow_retry(&mut self) -> Result<(), ArbitratorError> {
        if self.failed_files.is_empty() {
            return Ok(());
        }
        let interval_elapsed = match self.last_retry {
            None => true,
            Some(at) => {
                at + self.settings.retry_interval.as_millis() as u64 <= self.clock.epoch_ms()
            }
        };
        let pipeline_drained =
            self.pipeline_queue.qsize() < self.settings.max_files_in_pipeline;
        if !interval_elapsed && !pipeline_drained {
            return Ok(());
        }

        let batch: Vec<_> = self
            .failed_files
            .iter()
            .take(self.settings.queue_process_batch_size)
            .cloned()
            .collect();
        let moved = batch.len();
        for item in batch {
            self.enqueue_pipeline(&item)?;
            self.failed_files.remove(&item)?;
        }
        self.last_retry = Some(self.clock.epoch_ms());
        if moved > 0 {
            tracing::warn!(moved, "moved failed files back into the pipeline queue");
        }
        Ok(())
    }
}
