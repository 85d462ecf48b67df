//! OpenNIDS Common - Shared types for the intrusion detection engine
//!
//! This crate provides the vocabulary the rest of the workspace speaks:
//! - Decoded packet records and flow keys
//! - Detections and severities
//! - Engine configuration
//! - Capture statistics and health
//! - Error handling

pub mod config;
pub mod detection;
pub mod error;
pub mod packet;
pub mod stats;

pub use config::EngineConfig;
pub use detection::{Detection, DetectionKind, Severity};
pub use error::{NidsError, Result};
pub use packet::{FlowKey, HttpHints, PacketRecord, Protocol, TcpFlags};
pub use stats::{CaptureStats, StatsSnapshot};
