// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime tunables for the pipeline

use std::time::Duration;

/// Pipeline limits and intervals.
///
/// The defaults are sized for the common case of files being modified,
/// processed and transported far slower than the 200 ms arbitrator tick.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Upper bound on items concurrently under work (files-in-pipeline).
    pub max_files_in_pipeline: usize,
    /// Cap on concurrently running processor chains.
    pub max_simultaneous_processor_chains: usize,
    /// Cap on live transporter workers across all servers.
    pub max_simultaneous_transporters: usize,
    /// A transporter worker with more than this many queued operations is
    /// passed over when dispatching.
    pub max_transporter_queue_size: usize,
    /// Per-stage, per-tick item cap. The discover stage is exempt: it is the
    /// only non-durable entry point and must drain fully every tick.
    pub queue_process_batch_size: usize,
    /// Failed files rejoin the pipeline queue at most this often (or sooner,
    /// whenever the pipeline queue drains below `max_files_in_pipeline`).
    pub retry_interval: Duration,
    /// Restart the daemon after an unhandled main-loop error, unless the
    /// operator stopped it from the console.
    pub restart_after_crash: bool,
    pub restart_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_files_in_pipeline: 50,
            max_simultaneous_processor_chains: 1,
            max_simultaneous_transporters: 10,
            max_transporter_queue_size: 1,
            queue_process_batch_size: 20,
            retry_interval: Duration::from_secs(30),
            restart_after_crash: true,
            restart_interval: Duration::from_secs(10),
        }
    }
}
