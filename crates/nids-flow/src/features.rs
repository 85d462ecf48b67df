//! Stateful feature extraction
//!
//! Extraction mutates on read: every call records the access and flow
//! events in the auxiliary trackers and touches the connection. That is
//! what makes the rate features meaningful on a stream.

use crate::{AccessFrequencyTracker, ConnectionTracker, FlowRateTracker, LoginAttemptTracker};
use nids_common::PacketRecord;
use std::sync::Arc;

/// Feature order is fixed; the classifier schema refers to these names
pub const FEATURE_NAMES: [&str; 6] = [
    "packet_size",
    "protocol_type",
    "connection_duration",
    "failed_login_attempts",
    "data_transfer_rate",
    "access_frequency",
];

/// Fixed-order vector of the six scalars the detectors consume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; 6]);

impl FeatureVector {
    /// Degraded result: all zeros
    pub fn zeroed() -> Self {
        Self([0.0; 6])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn packet_size(&self) -> f64 {
        self.0[0]
    }

    pub fn failed_login_attempts(&self) -> f64 {
        self.0[3]
    }

    /// Feature map keyed by `FEATURE_NAMES`, for schema reconciliation
    pub fn named(&self) -> std::collections::HashMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .zip(self.0.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }
}

impl From<[f64; 6]> for FeatureVector {
    fn from(values: [f64; 6]) -> Self {
        Self(values)
    }
}

/// Combines the connection tracker with the three auxiliary trackers
pub struct FeatureExtractor {
    tracker: Arc<ConnectionTracker>,
    logins: Arc<LoginAttemptTracker>,
    flow_rates: Arc<FlowRateTracker>,
    access: Arc<AccessFrequencyTracker>,
}

impl FeatureExtractor {
    pub fn new(
        tracker: Arc<ConnectionTracker>,
        logins: Arc<LoginAttemptTracker>,
        flow_rates: Arc<FlowRateTracker>,
        access: Arc<AccessFrequencyTracker>,
    ) -> Self {
        Self { tracker, logins, flow_rates, access }
    }

    /// Handle to the login tracker, for brute-force signals
    pub fn logins(&self) -> &Arc<LoginAttemptTracker> {
        &self.logins
    }

    /// Handle to the connection tracker, for sweeps
    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// Extract the six features for one packet
    ///
    /// Never fails: non-finite intermediates degrade to 0.0 rather than
    /// poisoning the vector.
    pub fn extract(&self, pkt: &PacketRecord) -> FeatureVector {
        let key = pkt.flow_key();

        let snapshot = self.tracker.start_or_touch(key, pkt.raw_len as u64);
        self.flow_rates.record(key, pkt.raw_len as u64);
        self.access.record(pkt.src_ip);

        let raw = [
            pkt.raw_len as f64,
            pkt.protocol.encoded(),
            snapshot.duration_secs,
            self.logins.count(pkt.src_ip) as f64,
            self.flow_rates.rate(&key),
            self.access.rate(pkt.src_ip),
        ];

        FeatureVector(raw.map(|v| if v.is_finite() { v } else { 0.0 }))
    }
}
