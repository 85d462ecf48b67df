//! Capture and processing worker loops
//!
//! Single producer, single consumer, one bounded queue between them. The
//! producer never blocks: when the queue is full the packet is dropped and
//! counted. Both loops check the stop flag each iteration; a blocking
//! capture read in flight finishes before the flag is observed, which is
//! the documented shutdown-latency caveat.

use crate::source::{PacketSource, SourcePoll};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use nids_common::{CaptureStats, PacketRecord};
use nids_decode::decode_frame;
use nids_detect::{AlertDeduplicator, DetectionEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often the idle consumer wakes to check liveness
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Why the capture worker returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureExit {
    /// Stop flag observed
    Stopped,
    /// Source has no more frames (file replay complete)
    Exhausted,
    /// Source failed; the supervisor decides whether to restart
    Failed,
}

/// Blocking capture loop: poll source, decode, enqueue
pub(crate) fn capture_loop(
    mut source: Box<dyn PacketSource>,
    tx: Sender<PacketRecord>,
    stats: Arc<CaptureStats>,
    stop: Arc<AtomicBool>,
) -> CaptureExit {
    stats.set_capture_alive(true);
    let exit = loop {
        if stop.load(Ordering::Relaxed) {
            break CaptureExit::Stopped;
        }
        match source.next_frame() {
            Ok(SourcePoll::Frame(frame)) => {
                let pkt = match decode_frame(&frame.data, frame.ts) {
                    Ok(pkt) => pkt,
                    Err(e) => {
                        tracing::trace!(error = %e, "skipping undecodable frame");
                        stats.record_drop();
                        continue;
                    }
                };
                stats.record_packet(pkt.raw_len as u64);
                match tx.try_send(pkt) {
                    Ok(()) => stats.set_queue_depth(tx.len() as u64),
                    Err(TrySendError::Full(_)) => {
                        // Queue full: drop and count, never block the read loop
                        stats.record_drop();
                    }
                    Err(TrySendError::Disconnected(_)) => break CaptureExit::Stopped,
                }
            }
            Ok(SourcePoll::TimedOut) => continue,
            Ok(SourcePoll::Exhausted) => break CaptureExit::Exhausted,
            Err(e) => {
                tracing::error!(error = %e, "capture read failed");
                break CaptureExit::Failed;
            }
        }
    };
    stats.set_capture_alive(false);
    exit
}

/// Blocking processing loop: detector pipeline plus dedup/persist
pub(crate) fn process_loop(
    rx: Receiver<PacketRecord>,
    detection: Arc<DetectionEngine>,
    dedup: Arc<AlertDeduplicator>,
    stats: Arc<CaptureStats>,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(pkt) => {
                stats.set_queue_depth(rx.len() as u64);
                for det in detection.analyze(&pkt) {
                    let outcome = dedup.submit(&det, &pkt);
                    tracing::debug!(
                        rule = %det.rule_id,
                        severity = %det.severity,
                        ?outcome,
                        "detection"
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Frame, ScriptedSource};
    use chrono::Utc;
    use crossbeam_channel::bounded;
    use etherparse::PacketBuilder;

    fn tcp_frame(src: [u8; 4], dst_port: u16, payload: &[u8]) -> Frame {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4(src, [10, 0, 0, 1], 64)
            .tcp(50000, dst_port, 1, 64);
        let mut data = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut data, payload).unwrap();
        Frame { ts: Utc::now(), data }
    }

    #[test]
    fn test_capture_loop_decodes_and_enqueues() {
        let frames = vec![
            tcp_frame([10, 0, 0, 5], 80, b"hello"),
            tcp_frame([10, 0, 0, 6], 443, b"world"),
        ];
        let (tx, rx) = bounded(16);
        let stats = Arc::new(CaptureStats::new());
        let stop = Arc::new(AtomicBool::new(false));

        let exit = capture_loop(
            Box::new(ScriptedSource::new(frames)),
            tx,
            stats.clone(),
            stop,
        );
        assert_eq!(exit, CaptureExit::Exhausted);
        assert_eq!(rx.len(), 2);
        assert_eq!(stats.total_packets(), 2);
        assert_eq!(stats.dropped_packets(), 0);
    }

    #[test]
    fn test_full_queue_drops_never_blocks() {
        let frames: Vec<Frame> =
            (0..20).map(|i| tcp_frame([10, 0, 0, i as u8], 80, b"x")).collect();
        let (tx, rx) = bounded(4);
        let stats = Arc::new(CaptureStats::new());
        let stop = Arc::new(AtomicBool::new(false));

        let exit = capture_loop(
            Box::new(ScriptedSource::new(frames)),
            tx,
            stats.clone(),
            stop,
        );
        assert_eq!(exit, CaptureExit::Exhausted);
        // Queue occupancy never exceeded its capacity
        assert_eq!(rx.len(), 4);
        assert_eq!(stats.dropped_packets(), 16);
        assert_eq!(stats.total_packets(), 20);
    }

    #[test]
    fn test_undecodable_frames_are_counted_not_fatal() {
        let frames = vec![
            Frame { ts: Utc::now(), data: vec![0u8; 3] },
            tcp_frame([10, 0, 0, 5], 80, b"ok"),
        ];
        let (tx, rx) = bounded(16);
        let stats = Arc::new(CaptureStats::new());
        let stop = Arc::new(AtomicBool::new(false));

        capture_loop(Box::new(ScriptedSource::new(frames)), tx, stats.clone(), stop);
        assert_eq!(rx.len(), 1);
        assert_eq!(stats.dropped_packets(), 1);
    }

    #[test]
    fn test_stop_flag_halts_capture() {
        let frames: Vec<Frame> =
            (0..100).map(|_| tcp_frame([10, 0, 0, 5], 80, b"x")).collect();
        let (tx, _rx) = bounded(1000);
        let stats = Arc::new(CaptureStats::new());
        let stop = Arc::new(AtomicBool::new(true));

        let exit = capture_loop(Box::new(ScriptedSource::new(frames)), tx, stats, stop);
        assert_eq!(exit, CaptureExit::Stopped);
    }
}
