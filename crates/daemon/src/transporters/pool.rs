// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-server transporter pool with on-demand worker creation

use super::{StorageFactory, TransportReport, TransporterWorker};
use conveyor_core::Server;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Workers for one destination server. Starts empty; workers are created on
/// demand up to the server's `maxConnections` (0 = unlimited) and the global
/// transporter cap.
pub struct TransporterPool<Ctx> {
    server: Arc<Server>,
    factory: StorageFactory,
    workers: Vec<TransporterWorker<Ctx>>,
    reports: mpsc::UnboundedSender<TransportReport<Ctx>>,
}

impl<Ctx: Send + 'static> TransporterPool<Ctx> {
    pub fn new(
        server: Arc<Server>,
        factory: StorageFactory,
        reports: mpsc::UnboundedSender<TransportReport<Ctx>>,
    ) -> Self {
        Self { server, factory, workers: Vec::new(), reports }
    }

    /// Pick a worker for one more operation, or create one within the caps.
    ///
    /// Dispatch policy: the first existing worker whose queue is at or below
    /// `max_queue_size` wins; otherwise a new worker is created if both the
    /// global cap and the server's connection cap allow; otherwise `None`,
    /// and the item stays queued for a later tick.
    pub fn acquire(
        &mut self,
        max_queue_size: usize,
        global_cap: usize,
        live_total: &mut usize,
    ) -> Option<&TransporterWorker<Ctx>> {
        if let Some(i) = self.workers.iter().position(|w| w.qsize() <= max_queue_size) {
            return self.workers.get(i);
        }

        if *live_total >= global_cap {
            return None;
        }
        let max_connections = self.server.max_connections as usize;
        if max_connections != 0 && self.workers.len() >= max_connections {
            return None;
        }

        match (self.factory)(&self.server) {
            Ok(storage) => {
                tracing::info!(server = %self.server.name, "created transporter");
                let worker =
                    TransporterWorker::spawn(self.server.name.clone(), storage, self.reports.clone());
                self.workers.push(worker);
                *live_total += 1;
                self.workers.last()
            }
            Err(e) => {
                tracing::warn!(server = %self.server.name, error = %e, "could not start transporter");
                None
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stop_all(&self) {
        for worker in &self.workers {
            worker.stop();
        }
    }

    /// Wait for every worker to finish its in-flight operation and exit.
    /// Returns how many workers were joined.
    pub async fn join_all(self) -> usize {
        let count = self.workers.len();
        for worker in self.workers {
            worker.join().await;
        }
        count
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
