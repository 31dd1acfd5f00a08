// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One transporter worker: a task serializing operations for one destination

use super::{Storage, TransportAction, TransporterError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Completion report for one transport operation. `Ctx` is the caller's
/// opaque per-operation context, handed back verbatim so the caller can
/// demultiplex without keeping its own in-flight table.
#[derive(Debug)]
pub struct TransportReport<Ctx> {
    pub server: String,
    pub ctx: Ctx,
    /// Destination-relative path the operation targeted.
    pub dst: String,
    pub action: TransportAction,
    /// `Ok(Some(url))` after ADD_MODIFY, `Ok(None)` after DELETE.
    pub result: Result<Option<String>, String>,
}

enum Op<Ctx> {
    Sync { src: PathBuf, dst: String, action: TransportAction, ctx: Ctx },
    Stop,
}

/// A worker owning one [`Storage`] connection. Operations are executed one
/// at a time in queue order; completion flows back on the report channel.
pub struct TransporterWorker<Ctx> {
    tx: mpsc::UnboundedSender<Op<Ctx>>,
    queued: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl<Ctx: Send + 'static> TransporterWorker<Ctx> {
    pub fn spawn(
        server: String,
        storage: Box<dyn Storage>,
        reports: mpsc::UnboundedSender<TransportReport<Ctx>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(run(server, storage, rx, reports, Arc::clone(&queued)));
        Self { tx, queued, handle }
    }

    /// Enqueue an operation and return immediately.
    pub fn sync_file(&self, src: PathBuf, dst: String, action: TransportAction, ctx: Ctx) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Op::Sync { src, dst, action, ctx }).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("transporter worker is gone; dropping operation");
        }
    }

    /// Number of queued (not yet completed) operations.
    pub fn qsize(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Let the in-flight operation complete, then exit.
    pub fn stop(&self) {
        let _ = self.tx.send(Op::Stop);
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn run<Ctx: Send + 'static>(
    server: String,
    storage: Box<dyn Storage>,
    mut rx: mpsc::UnboundedReceiver<Op<Ctx>>,
    reports: mpsc::UnboundedSender<TransportReport<Ctx>>,
    queued: Arc<AtomicUsize>,
) {
    let mut storage = storage;
    while let Some(op) = rx.recv().await {
        let (src, dst, action, ctx) = match op {
            Op::Stop => break,
            Op::Sync { src, dst, action, ctx } => (src, dst, action, ctx),
        };

        // Storage implementations block (filesystem or network I/O), so the
        // operation runs on the blocking pool; the storage travels into the
        // closure and back out for the next operation.
        let blocking_dst = dst.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = execute(storage.as_mut(), &src, &blocking_dst, action);
            (storage, result)
        })
        .await;

        queued.fetch_sub(1, Ordering::SeqCst);
        match joined {
            Ok((returned, result)) => {
                storage = returned;
                let report = TransportReport {
                    server: server.clone(),
                    ctx,
                    dst,
                    action,
                    result: result.map_err(|e| e.to_string()),
                };
                if reports.send(report).is_err() {
                    break;
                }
            }
            Err(e) => {
                let report = TransportReport {
                    server: server.clone(),
                    ctx,
                    dst,
                    action,
                    result: Err(format!("transport operation aborted: {}", e)),
                };
                let _ = reports.send(report);
                break;
            }
        }
    }
    tracing::debug!(server = %server, "transporter worker stopped");
}

fn execute(
    storage: &mut dyn Storage,
    src: &std::path::Path,
    dst: &str,
    action: TransportAction,
) -> Result<Option<String>, TransporterError> {
    match action {
        TransportAction::AddModify => {
            if storage.exists(dst)? {
                storage.delete(dst)?;
            }
            Ok(Some(storage.save(src, dst)?))
        }
        TransportAction::Delete => {
            if storage.exists(dst)? {
                storage.delete(dst)?;
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
