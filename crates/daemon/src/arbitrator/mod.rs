// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The arbitrator: owner of every queue and orchestrator of the pipeline
//!
//! One task owns all durable and in-memory queues, the synced-files index
//! and the remaining-transporters map. Worker tasks (processor chains and
//! transporters) communicate back exclusively through report channels the
//! arbitrator drains at the start of each tick, so no queue is ever touched
//! off the arbitrator task.
//!
//! The tick runs the stages in a fixed order — discover, pipeline, filter,
//! process, transport, db, scheduled deletions, retry — so each tick moves a
//! file at most one full stage forward and never starves later stages.

mod db;
mod process;
mod retry;
mod stages;
mod transport;

use crate::fsmonitor::{event_mask, FsMonitor, MonitorError, MonitorEvent};
use crate::processors::{self, Processor};
use crate::transporters::{self, TransportReport, TransporterError, TransporterPool};
use crate::lifecycle::Paths;
use conveyor_config::{Config, ConfigError};
use conveyor_core::{
    Clock, FileEvent, Filter, FilterError, Merge, PipelineItem, PipelineKey, Rule, Settings,
    Source, SystemClock,
};
use conveyor_storage::{
    open_db, PersistentList, PersistentQueue, StorageError, SyncedFileIndex,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ArbitratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown processors referenced by rules: {}", .0.join(", "))]
    ProcessorsUnavailable(Vec<String>),
    #[error("unknown transporter kinds referenced by servers: {}", .0.join(", "))]
    TransportersUnavailable(Vec<String>),
    #[error("connection test for server '{server}' failed: {source}")]
    ServerConnection {
        server: String,
        #[source]
        source: TransporterError,
    },
    #[error("rule '{rule}': {source}")]
    InvalidFilter {
        rule: String,
        #[source]
        source: FilterError,
    },
    #[error("rule references unknown source '{0}'")]
    UnknownSource(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A rule prepared for matching: compiled filter (with the source's scan
/// path prepended to relative path fragments) and resolved processor chain.
pub(crate) struct ArbRule {
    pub rule: Rule,
    pub source: Arc<Source>,
    pub filter: Option<Filter>,
    /// Resolved chain; empty when the rule has no processor chain.
    pub chain: Vec<&'static dyn Processor>,
}

impl ArbRule {
    pub(crate) fn key_for(&self, input_file: &Path, event: FileEvent) -> PipelineKey {
        PipelineKey::new(input_file, event, &self.rule.source, &self.rule.label)
    }
}

pub(crate) struct ProcessTask {
    pub input_file: PathBuf,
    pub event: FileEvent,
    pub rule: Arc<ArbRule>,
    /// Set when the chain runs once per destination server.
    pub processed_for: Option<String>,
}

/// One queued transport operation; also the opaque context handed to the
/// transporter worker and returned in its report.
#[derive(Clone)]
pub(crate) struct TransportTask {
    pub input_file: PathBuf,
    pub event: FileEvent,
    pub rule: Arc<ArbRule>,
    pub processed_for: Option<String>,
    pub output_file: PathBuf,
}

pub(crate) struct DbTask {
    pub input_file: PathBuf,
    pub event: FileEvent,
    pub rule: Arc<ArbRule>,
    pub output_file: PathBuf,
    pub url: Option<String>,
    pub server: String,
}

/// Completion report of one processor-chain run.
pub(crate) struct ChainReport {
    pub input_file: PathBuf,
    pub event: FileEvent,
    pub rule: Arc<ArbRule>,
    pub processed_for: Option<String>,
    pub result: Result<PathBuf, String>,
}

pub type DaemonArbitrator = Arbitrator<SystemClock>;

impl<C: Clock> std::fmt::Debug for Arbitrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbitrator").finish_non_exhaustive()
    }
}

pub struct Arbitrator<C: Clock = SystemClock> {
    pub(crate) settings: Settings,
    pub(crate) clock: C,
    pub(crate) working_dir: PathBuf,
    pub(crate) synced_files_db: PathBuf,
    fsmonitor_db: PathBuf,
    ignored_dirs: Vec<String>,
    sources: BTreeMap<String, Arc<Source>>,
    pub(crate) rules: Vec<Arc<ArbRule>>,

    monitor: Option<FsMonitor>,
    monitor_tx: mpsc::UnboundedSender<MonitorEvent>,
    monitor_rx: mpsc::UnboundedReceiver<MonitorEvent>,
    pub(crate) chain_tx: mpsc::UnboundedSender<ChainReport>,
    chain_rx: mpsc::UnboundedReceiver<ChainReport>,
    transport_rx: mpsc::UnboundedReceiver<TransportReport<TransportTask>>,

    pub(crate) discover_queue: VecDeque<(PathBuf, FileEvent)>,
    pub(crate) pipeline_queue: PersistentQueue<PipelineItem>,
    pub(crate) files_in_pipeline: PersistentList<PipelineItem>,
    pub(crate) failed_files: PersistentList<PipelineItem>,
    pub(crate) files_to_delete: PersistentList<(PathBuf, u64)>,
    pub(crate) filter_queue: VecDeque<PipelineItem>,
    pub(crate) process_queue: VecDeque<ProcessTask>,
    pub(crate) transport_queues: BTreeMap<String, VecDeque<TransportTask>>,
    pub(crate) db_queue: VecDeque<DbTask>,
    pub(crate) retry_queue: VecDeque<PipelineItem>,
    pub(crate) remaining_transporters: HashMap<PipelineKey, BTreeSet<String>>,
    pub(crate) index: SyncedFileIndex,

    pub(crate) pools: BTreeMap<String, TransporterPool<TransportTask>>,
    pub(crate) live_transporters: usize,
    pub(crate) chains_running: usize,
    /// Epoch-ms stamp of the last failed-files replay.
    pub(crate) last_retry: Option<u64>,
}

impl<C: Clock> Arbitrator<C> {
    pub fn new(
        config: Config,
        paths: &Paths,
        settings: Settings,
        clock: C,
    ) -> Result<Self, ArbitratorError> {
        let mut config = config;

        // symlink_or_copy destinations symlink only files living under a
        // configured source; derive that root set from the sources.
        let symlink_within = config
            .sources
            .values()
            .map(|s| s.scan_path.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":");
        for server in config.servers.values_mut() {
            if server.transporter == "symlink_or_copy" || server.transporter == "none" {
                server
                    .settings
                    .insert("symlinkWithin".to_string(), symlink_within.clone());
            }
        }

        // Every referenced processor must resolve.
        let mut missing: BTreeSet<String> = BTreeSet::new();
        for rule in &config.rules {
            for name in rule.processor_chain.as_deref().unwrap_or(&[]) {
                if processors::lookup(name).is_none() {
                    missing.insert(name.clone());
                }
            }
        }
        if !missing.is_empty() {
            return Err(ArbitratorError::ProcessorsUnavailable(missing.into_iter().collect()));
        }

        // Every server's transporter kind must resolve, and every server
        // must be reachable right now: a destination that cannot be used is
        // a configuration problem, not something to retry around.
        let mut missing_kinds: BTreeSet<String> = BTreeSet::new();
        for server in config.servers.values() {
            if transporters::lookup(&server.transporter).is_none() {
                missing_kinds.insert(server.transporter.clone());
            }
        }
        if !missing_kinds.is_empty() {
            return Err(ArbitratorError::TransportersUnavailable(
                missing_kinds.into_iter().collect(),
            ));
        }
        for server in config.servers.values() {
            if let Some(factory) = transporters::lookup(&server.transporter) {
                factory(server).map_err(|source| ArbitratorError::ServerConnection {
                    server: server.name.clone(),
                    source,
                })?;
                tracing::info!(server = %server.name, "server connection test passed");
            }
        }

        let sources: BTreeMap<String, Arc<Source>> = config
            .sources
            .iter()
            .map(|(name, source)| (name.clone(), Arc::new(source.clone())))
            .collect();

        let rules = compile_rules(&config.rules, &sources)?;

        let data_db = open_db(&paths.persistent_data_db())?;
        let pipeline_queue = PersistentQueue::open(Arc::clone(&data_db), "pipeline_queue")?;
        let files_in_pipeline = PersistentList::open(Arc::clone(&data_db), "pipeline_list")?;
        let failed_files = PersistentList::open(Arc::clone(&data_db), "failed_files_list")?;
        let files_to_delete = PersistentList::open(Arc::clone(&data_db), "files_to_delete_list")?;
        tracing::warn!(
            pipeline = pipeline_queue.qsize(),
            in_pipeline = files_in_pipeline.len(),
            failed = failed_files.len(),
            to_delete = files_to_delete.len(),
            "opened persistent pipeline state"
        );

        let synced_files_db = paths.synced_files_db();
        let index = SyncedFileIndex::open(&synced_files_db)?;
        tracing::warn!(synced = index.count()?, "connected to the synced-files index");

        let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
        let (chain_tx, chain_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let mut transport_queues = BTreeMap::new();
        let mut pools = BTreeMap::new();
        for (name, server) in &config.servers {
            transport_queues.insert(name.clone(), VecDeque::new());
            if let Some(factory) = transporters::lookup(&server.transporter) {
                pools.insert(
                    name.clone(),
                    TransporterPool::new(
                        Arc::new(server.clone()),
                        factory,
                        transport_tx.clone(),
                    ),
                );
                tracing::info!(server = %name, "created transporter pool");
            }
        }

        Ok(Self {
            settings,
            clock,
            working_dir: paths.working_dir.clone(),
            synced_files_db,
            fsmonitor_db: paths.fsmonitor_db(),
            ignored_dirs: config.ignored_dirs.clone(),
            sources,
            rules,
            monitor: None,
            monitor_tx,
            monitor_rx,
            chain_tx,
            chain_rx,
            transport_rx,
            discover_queue: VecDeque::new(),
            pipeline_queue,
            files_in_pipeline,
            failed_files,
            files_to_delete,
            filter_queue: VecDeque::new(),
            process_queue: VecDeque::new(),
            transport_queues,
            db_queue: VecDeque::new(),
            retry_queue: VecDeque::new(),
            remaining_transporters: HashMap::new(),
            index,
            pools,
            live_transporters: 0,
            chains_running: 0,
            last_retry: None,
        })
    }

    /// Recover persisted state, clean the working directory and start the
    /// filesystem monitor. Recovery runs before the monitor so replayed
    /// in-flight items precede any new events.
    pub fn start(&mut self) -> Result<(), ArbitratorError> {
        let stranded = self.files_in_pipeline.items();
        for item in &stranded {
            self.enqueue_pipeline(item)?;
        }
        for item in &stranded {
            self.files_in_pipeline.remove(item)?;
        }
        if !stranded.is_empty() {
            tracing::warn!(
                count = stranded.len(),
                "moved in-flight items from the previous run back into the pipeline queue"
            );
        }
        self.allow_retry()?;

        self.clean_working_dir();

        let monitor =
            FsMonitor::spawn(&self.fsmonitor_db, self.ignored_dirs.clone(), self.monitor_tx.clone())?;
        for source in self.sources.values() {
            tracing::info!(
                source = %source.name,
                path = %source.scan_path.display(),
                "monitoring"
            );
            monitor.add_dir(&source.scan_path, event_mask::ALL);
        }
        self.monitor = Some(monitor);
        Ok(())
    }

    /// One pass over every stage, in the load-bearing order.
    pub fn tick(&mut self) -> Result<(), ArbitratorError> {
        self.drain_worker_reports();
        self.drain_monitor_events();
        self.process_discover_queue()?;
        self.process_pipeline_queue()?;
        self.process_filter_queue()?;
        self.process_process_queue();
        self.process_transport_queues();
        self.process_db_queue()?;
        self.process_files_to_delete()?;
        self.process_retry_queue()?;
        self.allow_retry()?;
        Ok(())
    }

    /// Main loop: tick five times a second until `stop` is raised, then shut
    /// down in an orderly fashion. An unhandled error also shuts down, and
    /// is returned so the supervisor wrapper can decide whether to restart.
    pub async fn run(&mut self, stop: &AtomicBool) -> Result<(), ArbitratorError> {
        self.start()?;
        tracing::warn!("fully up and running now");
        while !stop.load(Ordering::SeqCst) {
            if let Err(e) = self.tick() {
                tracing::error!(error = %e, "unhandled error in the main loop, stopping");
                self.shutdown().await;
                return Err(e);
            }
            tokio::time::sleep(TICK_INTERVAL).await;
        }
        self.shutdown().await;
        Ok(())
    }

    /// Orderly shutdown: stop the monitor, sync the discover queue one last
    /// time, stop and join every transporter. All durable structures are
    /// left intact — they describe the resumable state.
    pub async fn shutdown(&mut self) {
        tracing::warn!("stopping");
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
            tracing::warn!("stopped the filesystem monitor");
        }

        self.drain_monitor_events();
        if let Err(e) = self.process_discover_queue() {
            tracing::error!(error = %e, "final discover sync failed");
        } else {
            tracing::info!("final sync of the discover queue into the pipeline queue done");
        }

        for (server, pool) in std::mem::take(&mut self.pools) {
            pool.stop_all();
            let joined = pool.join_all().await;
            self.live_transporters = self.live_transporters.saturating_sub(joined);
            if joined > 0 {
                tracing::warn!(server = %server, "stopped transporters");
            }
        }

        tracing::warn!(
            pipeline = self.pipeline_queue.qsize(),
            in_pipeline = self.files_in_pipeline.len(),
            failed = self.failed_files.len(),
            to_delete = self.files_to_delete.len(),
            synced = self.index.count().unwrap_or_default(),
            "persistent state at shutdown"
        );

        self.clean_working_dir();
        tracing::warn!("shut down");
    }

    /// Entry point for filesystem events: merge into the pipeline via the
    /// discover queue. Files that vanished before we got here are skipped
    /// (unless the event is the deletion itself).
    pub fn monitor_callback(&mut self, input_file: PathBuf, event: FileEvent) {
        if event == FileEvent::DeleteOldFile {
            return;
        }
        if event.touches_source() {
            match std::fs::metadata(&input_file) {
                Ok(meta) if meta.is_file() => {}
                _ => return,
            }
        }
        self.discover_queue.push_back((input_file, event));
    }

    /// Put an item on the pipeline queue, merging with any queued entry for
    /// the same path per the event-merge table.
    pub(crate) fn enqueue_pipeline(&mut self, item: &PipelineItem) -> Result<(), StorageError> {
        let key = item.key();
        match self.pipeline_queue.get_item_for_key(&key)? {
            None => self.pipeline_queue.put(item, &key),
            Some(existing) => match FileEvent::merge(existing.event, item.event) {
                Merge::Replace(event) => {
                    tracing::info!(
                        file = %item.input_file.display(),
                        old = %existing.event,
                        new = %item.event,
                        merged = %event,
                        "pipeline queue: merged events"
                    );
                    if event == existing.event {
                        Ok(())
                    } else {
                        self.pipeline_queue
                            .update(&PipelineItem::new(item.input_file.clone(), event), &key)
                    }
                }
                Merge::Cancel => {
                    tracing::info!(
                        file = %item.input_file.display(),
                        "pipeline queue: events cancel each other out, removed the file"
                    );
                    self.pipeline_queue.remove_item_for_key(&key)
                }
            },
        }
    }

    /// Drop any completion bookkeeping for an item that left the pipeline
    /// without finishing (dropped at the filter, or parked for retry). The
    /// next pass through the filter repopulates it from scratch.
    pub(crate) fn forget_remaining(&mut self, input_file: &Path, event: FileEvent) {
        self.remaining_transporters
            .retain(|key, _| !(key.event == event && key.input_file == *input_file));
    }

    fn clean_working_dir(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.working_dir) {
            tracing::error!(
                dir = %self.working_dir.display(),
                error = %e,
                "cannot create the working directory"
            );
            return;
        }
        if let Ok(read) = std::fs::read_dir(&self.working_dir) {
            for entry in read.flatten() {
                let path = entry.path();
                let result = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                if let Err(e) = result {
                    tracing::warn!(path = %path.display(), error = %e, "cannot clean up");
                }
            }
        }
        tracing::info!(dir = %self.working_dir.display(), "cleaned up the working directory");
    }

    // Introspection, mostly for the status log and tests.

    pub fn pipeline_queue_size(&self) -> usize {
        self.pipeline_queue.qsize()
    }

    pub fn files_in_pipeline_count(&self) -> usize {
        self.files_in_pipeline.len()
    }

    pub fn failed_files_count(&self) -> usize {
        self.failed_files.len()
    }

    pub fn scheduled_deletions(&self) -> Vec<(PathBuf, u64)> {
        self.files_to_delete.items()
    }

    pub fn index(&self) -> &SyncedFileIndex {
        &self.index
    }

    /// True when nothing is queued, in flight, or owed completion.
    pub fn is_idle(&self) -> bool {
        self.discover_queue.is_empty()
            && self.pipeline_queue.is_empty()
            && self.files_in_pipeline.is_empty()
            && self.filter_queue.is_empty()
            && self.process_queue.is_empty()
            && self.transport_queues.values().all(VecDeque::is_empty)
            && self.db_queue.is_empty()
            && self.retry_queue.is_empty()
            && self.remaining_transporters.is_empty()
            && self.chains_running == 0
    }
}

fn compile_rules(
    rules: &[Rule],
    sources: &BTreeMap<String, Arc<Source>>,
) -> Result<Vec<Arc<ArbRule>>, ArbitratorError> {
    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        let source = sources
            .get(&rule.source)
            .ok_or_else(|| ArbitratorError::UnknownSource(rule.source.clone()))?
            .clone();

        let filter = match &rule.filter {
            None => None,
            Some(conditions) => {
                let mut conditions = conditions.clone();
                // Relative path fragments are rooted at the source's scan
                // path before matching.
                if let Some(paths) = &conditions.paths {
                    let scan = source.scan_path.to_string_lossy();
                    let prefixed: Vec<String> = paths
                        .split(':')
                        .map(|fragment| {
                            if fragment.starts_with('/') {
                                fragment.to_string()
                            } else {
                                format!("{}/{}", scan.trim_end_matches('/'), fragment)
                            }
                        })
                        .collect();
                    conditions.paths = Some(prefixed.join(":"));
                }
                Some(Filter::new(&conditions).map_err(|source| {
                    ArbitratorError::InvalidFilter { rule: rule.label.clone(), source }
                })?)
            }
        };

        let mut chain: Vec<&'static dyn Processor> = Vec::new();
        for name in rule.processor_chain.as_deref().unwrap_or(&[]) {
            match processors::lookup(name) {
                Some(processor) => chain.push(processor),
                None => {
                    return Err(ArbitratorError::ProcessorsUnavailable(vec![name.clone()]));
                }
            }
        }

        tracing::info!(rule = %rule.label, source = %rule.source, "collected rule metadata");
        compiled.push(Arc::new(ArbRule { rule: rule.clone(), source, filter, chain }));
    }
    Ok(compiled)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
