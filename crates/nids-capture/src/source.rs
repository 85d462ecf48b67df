//! Packet sources
//!
//! A source yields raw frames from a live device or a capture file. The
//! trait hides which; the pipeline only polls.

use chrono::{DateTime, TimeZone, Utc};
use nids_common::{EngineConfig, NidsError, Result};
use pcap::{Active, Capture, Device, Offline};

/// One raw frame with its capture timestamp
#[derive(Debug, Clone)]
pub struct Frame {
    pub ts: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// Result of polling a source once
#[derive(Debug)]
pub enum SourcePoll {
    /// A frame arrived
    Frame(Frame),
    /// Read timeout elapsed with no traffic; poll again
    TimedOut,
    /// The source has no more frames (file replay done)
    Exhausted,
}

/// Something the capture worker can poll for frames
pub trait PacketSource: Send {
    fn next_frame(&mut self) -> Result<SourcePoll>;
}

fn timeval_to_utc(sec: i64, usec: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(sec, (usec.clamp(0, 999_999) * 1000) as u32)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Live capture from a network interface
pub struct LiveSource {
    capture: Capture<Active>,
}

impl LiveSource {
    /// Open the configured interface, or auto-detect when none is named
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let device = resolve_device(config.interface.as_deref())?;
        tracing::info!(interface = %device.name, "opening capture device");

        let capture = Capture::from_device(device)
            .map_err(|e| map_open_error(&e))?
            .promisc(true)
            .timeout(config.capture_timeout_ms as i32)
            .open()
            .map_err(|e| map_open_error(&e))?;

        Ok(Self { capture })
    }
}

impl PacketSource for LiveSource {
    fn next_frame(&mut self) -> Result<SourcePoll> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(SourcePoll::Frame(Frame {
                ts: timeval_to_utc(packet.header.ts.tv_sec as i64, packet.header.ts.tv_usec as i64),
                data: packet.data.to_vec(),
            })),
            Err(pcap::Error::TimeoutExpired) => Ok(SourcePoll::TimedOut),
            Err(pcap::Error::NoMorePackets) => Ok(SourcePoll::Exhausted),
            Err(e) => Err(NidsError::Capture(e.to_string())),
        }
    }
}

/// Replay from a capture file
pub struct FileSource {
    capture: Capture<Offline>,
}

impl FileSource {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let capture = Capture::from_file(path)
            .map_err(|e| NidsError::InvalidCapture(format!("{}: {e}", path.display())))?;
        Ok(Self { capture })
    }
}

impl PacketSource for FileSource {
    fn next_frame(&mut self) -> Result<SourcePoll> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(SourcePoll::Frame(Frame {
                ts: timeval_to_utc(packet.header.ts.tv_sec as i64, packet.header.ts.tv_usec as i64),
                data: packet.data.to_vec(),
            })),
            Err(pcap::Error::NoMorePackets) => Ok(SourcePoll::Exhausted),
            Err(pcap::Error::TimeoutExpired) => Ok(SourcePoll::TimedOut),
            Err(e) => Err(NidsError::Capture(e.to_string())),
        }
    }
}

fn resolve_device(name: Option<&str>) -> Result<Device> {
    match name {
        Some(wanted) => {
            let devices =
                Device::list().map_err(|e| NidsError::Capture(e.to_string()))?;
            let available = devices
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            devices
                .into_iter()
                .find(|d| d.name == wanted)
                .ok_or_else(|| NidsError::InterfaceNotFound {
                    name: wanted.to_string(),
                    available,
                })
        }
        None => Device::lookup()
            .map_err(|e| map_open_error(&e))?
            .ok_or_else(|| NidsError::CaptureUnavailable {
                detail: "no capturable interface found".into(),
                suggestion: "configure `interface` explicitly".into(),
            }),
    }
}

/// Permission failures get the actionable remediation path
fn map_open_error(e: &pcap::Error) -> NidsError {
    let text = e.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("permission") || lowered.contains("operation not permitted") {
        NidsError::insufficient_privileges(text)
    } else {
        NidsError::Capture(text)
    }
}

/// Scripted source for tests and drills: yields queued frames, then ends
pub struct ScriptedSource {
    frames: std::collections::VecDeque<Frame>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames: frames.into() }
    }
}

impl PacketSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<SourcePoll> {
        match self.frames.pop_front() {
            Some(frame) => Ok(SourcePoll::Frame(frame)),
            None => Ok(SourcePoll::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_drains() {
        let mut source = ScriptedSource::new(vec![
            Frame { ts: Utc::now(), data: vec![0u8; 20] },
            Frame { ts: Utc::now(), data: vec![1u8; 20] },
        ]);
        assert!(matches!(source.next_frame().unwrap(), SourcePoll::Frame(_)));
        assert!(matches!(source.next_frame().unwrap(), SourcePoll::Frame(_)));
        assert!(matches!(source.next_frame().unwrap(), SourcePoll::Exhausted));
    }

    #[test]
    fn test_permission_error_mapping() {
        let err = map_open_error(&pcap::Error::PcapError(
            "socket: Operation not permitted".into(),
        ));
        assert!(matches!(err, NidsError::CaptureUnavailable { .. }));
        assert!(err.to_string().contains("CAP_NET_RAW"));
    }

    #[test]
    fn test_timeval_conversion() {
        let ts = timeval_to_utc(1_700_000_000, 250_000);
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }
}
