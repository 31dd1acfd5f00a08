// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock abstraction for the pipeline's deadline bookkeeping
//!
//! The pipeline needs exactly one dimension of time: milliseconds since the
//! Unix epoch. Scheduled source deletions are stamped with an absolute
//! deadline so they survive restarts, and the failed-file retry window is
//! paced against the same scale. Tests drive both through [`FakeClock`],
//! which stands still until advanced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of milliseconds-since-epoch time.
pub trait Clock: Clone + Send + Sync {
    fn epoch_ms(&self) -> u64;

    /// The moment `delay` seconds from now. Used to stamp a source file's
    /// scheduled deletion once every destination has confirmed the sync.
    fn deadline_after_secs(&self, delay: u64) -> u64 {
        self.epoch_ms() + delay * 1000
    }
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock for tests: starts at a fixed epoch and only moves when advanced,
/// so deletion windows and retry intervals can be crossed deterministically.
/// Clones share the same time, letting a test hold a handle to the clock it
/// handed to the daemon.
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { epoch_ms: Arc::new(AtomicU64::new(1_000_000)) }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        self.epoch_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the absolute epoch-milliseconds value
    pub fn set_epoch_ms(&self, ms: u64) {
        self.epoch_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.epoch_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
