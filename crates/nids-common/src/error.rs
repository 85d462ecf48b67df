//! Error types for OpenNIDS
//!
//! User-visible failures are structured (kind + detail + suggestion) and
//! classified per the error policy: skip-and-count, log-and-degrade, or
//! fatal to a single worker.

use thiserror::Error;

/// OpenNIDS error type
#[derive(Error, Debug)]
pub enum NidsError {
    /// Frame could not be decoded; skip and count, never fatal
    #[error("undecodable frame: {0}")]
    Decode(String),

    /// Capture cannot start for this process; engine degrades to
    /// analysis-only mode
    #[error("capture unavailable: {detail}. {suggestion}")]
    CaptureUnavailable { detail: String, suggestion: String },

    /// Requested interface does not exist; fatal to the capture worker only
    #[error("interface '{name}' not found; available: [{available}]")]
    InterfaceNotFound { name: String, available: String },

    /// PCAP file rejected before parsing
    #[error("invalid capture file: {0}")]
    InvalidCapture(String),

    /// Underlying capture library failure
    #[error("capture error: {0}")]
    Capture(String),

    /// Model is not loaded or not trained; detectors return no detection
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Alert store or cache backend failure; degrade to in-memory state
    #[error("store error: {0}")]
    Store(String),

    /// Bad configuration value
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for OpenNIDS
pub type Result<T> = std::result::Result<T, NidsError>;

impl NidsError {
    /// Capture-privileges error with its remediation hint
    pub fn insufficient_privileges(detail: impl Into<String>) -> Self {
        NidsError::CaptureUnavailable {
            detail: detail.into(),
            suggestion: "grant CAP_NET_RAW (setcap cap_net_raw+ep) or run \
                         as root; continuing in analysis-only mode"
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_messages() {
        let err = NidsError::insufficient_privileges("socket: EPERM");
        let msg = err.to_string();
        assert!(msg.contains("EPERM"));
        assert!(msg.contains("CAP_NET_RAW"));

        let err = NidsError::InterfaceNotFound {
            name: "eth9".into(),
            available: "eth0, lo".into(),
        };
        assert!(err.to_string().contains("eth0"));
    }
}
