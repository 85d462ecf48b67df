//! OpenNIDS Live Ingest
//!
//! A small fixed set of long-lived workers:
//!
//! - capture worker (blocking pcap loop, supervised with backoff)
//! - processing worker (detector pipeline, pulls with timeout)
//! - eviction sweep (timer task over the connection table + dedup cache)
//! - supervisor (liveness + restart policy)
//!
//! Shutdown is cooperative: a flag checked per loop iteration. An
//! in-flight blocking capture read completes before the flag is observed.

mod pipeline;
mod source;
mod supervisor;

pub use source::{FileSource, Frame, LiveSource, PacketSource, ScriptedSource, SourcePoll};

use crossbeam_channel::bounded;
use nids_common::{CaptureStats, EngineConfig, Result, StatsSnapshot};
use nids_detect::{AlertDeduplicator, DetectionEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Builds a packet source; invoked again on every capture restart
pub type SourceFactory = Box<dyn Fn() -> Result<Box<dyn PacketSource>> + Send + Sync>;

/// Wires the workers around a detection engine
pub struct Engine {
    config: Arc<EngineConfig>,
    stats: Arc<CaptureStats>,
    detection: Arc<DetectionEngine>,
    dedup: Arc<AlertDeduplicator>,
}

impl Engine {
    pub fn new(
        config: Arc<EngineConfig>,
        detection: Arc<DetectionEngine>,
        dedup: Arc<AlertDeduplicator>,
    ) -> Self {
        Self {
            config,
            stats: Arc::new(CaptureStats::new()),
            detection,
            dedup,
        }
    }

    /// Shared stats handle for health endpoints
    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Current health/stats snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Start against the configured live interface
    pub fn start_live(&self) -> EngineHandle {
        let config = self.config.clone();
        self.start_with(Box::new(move || {
            LiveSource::open(&config).map(|s| Box::new(s) as Box<dyn PacketSource>)
        }))
    }

    /// Start with a caller-provided source factory
    pub fn start_with(&self, factory: SourceFactory) -> EngineHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let (tx, rx) = bounded(self.config.queue_capacity);

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Processing worker
        tasks.push(tokio::task::spawn_blocking({
            let detection = self.detection.clone();
            let dedup = self.dedup.clone();
            let stats = self.stats.clone();
            let stop = stop.clone();
            move || pipeline::process_loop(rx, detection, dedup, stats, stop)
        }));

        // Eviction sweep
        tasks.push(tokio::spawn(sweep_loop(
            self.detection.clone(),
            self.dedup.clone(),
            self.config.clone(),
            stop.clone(),
            notify.clone(),
        )));

        // Supervisor owns the capture worker (and the queue sender)
        tasks.push(tokio::spawn(supervisor::supervise(
            factory,
            tx,
            self.stats.clone(),
            self.config.clone(),
            stop.clone(),
            notify.clone(),
        )));

        EngineHandle { stop, notify, tasks }
    }
}

/// Timer task: evict idle connections, prune the dedup cache
async fn sweep_loop(
    detection: Arc<DetectionEngine>,
    dedup: Arc<AlertDeduplicator>,
    config: Arc<EngineConfig>,
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
) {
    let tracker = detection.extractor().tracker().clone();
    let interval = config.sweep_interval();
    let idle = config.idle_timeout();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = notify.notified() => {}
        }
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let evicted = tracker.sweep(idle);
        let pruned = dedup.prune();
        tracing::debug!(evicted, pruned, "eviction sweep");
    }
}

/// Running pipeline handle
pub struct EngineHandle {
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Request cooperative shutdown
    ///
    /// Queued packets are drained or dropped, not guaranteed processed;
    /// an in-flight blocking capture read finishes first.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "worker join failed");
            }
        }
    }
}
