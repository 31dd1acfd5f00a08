// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process stage: run processor chains under the concurrency cap

use super::{Arbitrator, ChainReport, ProcessTask};
use crate::processors::run_chain;
use conveyor_core::Clock;

impl<C: Clock> Arbitrator<C> {
    pub(crate) fn process_process_queue(&mut self) {
        let mut processed = 0;
        while processed < self.settings.queue_process_batch_size
            && self.chains_running < self.settings.max_simultaneous_processor_chains
        {
            let Some(task) = self.process_queue.pop_front() else { break };
            self.chains_running += 1;
            tracing::debug!(
                file = %task.input_file.display(),
                chain = ?task.rule.rule.processor_chain,
                server = task.processed_for.as_deref(),
                "started processor chain"
            );
            self.spawn_chain(task);
            processed += 1;
        }
    }

    /// Run one chain on the blocking pool; the completion report re-enters
    /// through the chain channel on a later tick.
    fn spawn_chain(&self, task: ProcessTask) {
        let chain = task.rule.chain.clone();
        let input_file = task.input_file.clone();
        let document_root = task.rule.source.document_root.clone();
        let base_path = task.rule.source.base_path.clone();
        let server = task.processed_for.clone();
        // Per-server runs get their own working subtree: they transform the
        // same input concurrently and must not overwrite each other.
        let working_dir = match &task.processed_for {
            Some(server) => self.working_dir.join(server),
            None => self.working_dir.clone(),
        };
        let synced_files_db = self.synced_files_db.clone();
        let reports = self.chain_tx.clone();

        tokio::spawn(async move {
            let blocking_input = input_file.clone();
            let joined = tokio::task::spawn_blocking(move || {
                run_chain(
                    &chain,
                    &blocking_input,
                    document_root.as_deref(),
                    base_path.as_deref(),
                    server.as_deref(),
                    &working_dir,
                    &synced_files_db,
                )
            })
            .await;

            let result = match joined {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("processor chain aborted: {}", e)),
            };
            let _ = reports.send(ChainReport {
                input_file,
                event: task.event,
                rule: task.rule,
                processed_for: task.processed_for,
                result,
            });
        });
    }
}
