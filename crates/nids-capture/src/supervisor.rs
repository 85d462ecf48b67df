//! Capture-worker supervision
//!
//! The supervisor owns the capture worker's lifecycle: it builds a source,
//! runs the blocking loop on the blocking pool, polls liveness, and
//! restarts with exponential backoff on unexpected death. After
//! `max_retries` the engine permanently degrades to analysis-only mode.

use crate::pipeline::{capture_loop, CaptureExit};
use crate::SourceFactory;
use crossbeam_channel::Sender;
use nids_common::{CaptureStats, EngineConfig, NidsError, PacketRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) async fn supervise(
    factory: SourceFactory,
    tx: Sender<PacketRecord>,
    stats: Arc<CaptureStats>,
    config: Arc<EngineConfig>,
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
) {
    let check_interval = Duration::from_secs(config.status_check_interval_secs.max(1));
    let mut attempts = 0u32;

    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }

        let source = match factory() {
            Ok(source) => source,
            Err(e @ NidsError::InterfaceNotFound { .. }) => {
                // Fatal for capture only; other workers keep running
                tracing::error!(error = %e, "capture disabled");
                stats.set_analysis_only(true);
                return;
            }
            Err(e @ NidsError::CaptureUnavailable { .. }) => {
                tracing::error!(error = %e, "capture disabled");
                stats.set_analysis_only(true);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture source open failed");
                if !backoff_or_give_up(&mut attempts, &config, &stats, &stop, &notify).await {
                    return;
                }
                continue;
            }
        };

        let worker = tokio::task::spawn_blocking({
            let tx = tx.clone();
            let stats = stats.clone();
            let stop = stop.clone();
            move || capture_loop(source, tx, stats, stop)
        });

        // Liveness poll until the worker ends or shutdown is requested
        while !worker.is_finished() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            sleep_interruptible(check_interval, &notify).await;
        }

        match worker.await {
            Ok(CaptureExit::Stopped) => return,
            Ok(CaptureExit::Exhausted) => {
                tracing::info!("capture source exhausted");
                return;
            }
            Ok(CaptureExit::Failed) => {
                tracing::warn!("capture worker died unexpectedly");
            }
            Err(e) => {
                tracing::error!(error = %e, "capture worker panicked");
            }
        }

        if !backoff_or_give_up(&mut attempts, &config, &stats, &stop, &notify).await {
            return;
        }
    }
}

/// Returns false once retries are exhausted
async fn backoff_or_give_up(
    attempts: &mut u32,
    config: &EngineConfig,
    stats: &CaptureStats,
    stop: &AtomicBool,
    notify: &Notify,
) -> bool {
    *attempts += 1;
    if *attempts > config.max_retries {
        tracing::error!(
            retries = config.max_retries,
            "capture restarts exhausted; continuing in analysis-only mode"
        );
        stats.set_analysis_only(true);
        return false;
    }

    let exponent = attempts.saturating_sub(1).min(10);
    let delay_secs = config
        .retry_base_secs
        .saturating_mul(1u64 << exponent)
        .min(config.retry_cap_secs);
    tracing::info!(attempt = *attempts, delay_secs, "capture restart scheduled");

    sleep_interruptible(Duration::from_secs(delay_secs), notify).await;
    !stop.load(Ordering::Relaxed)
}

/// Sleep that wakes early on shutdown notification
async fn sleep_interruptible(duration: Duration, notify: &Notify) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = notify.notified() => {}
    }
}
