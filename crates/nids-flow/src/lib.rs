//! OpenNIDS Flow State
//!
//! Per-connection tracking with idle eviction, the rolling-window
//! auxiliary trackers, and the stateful feature extractor that feeds the
//! ML detectors.

mod features;
mod tracker;
mod windows;

pub use features::{FeatureExtractor, FeatureVector, FEATURE_NAMES};
pub use tracker::{ConnectionSnapshot, ConnectionTracker};
pub use windows::{AccessFrequencyTracker, FlowRateTracker, LoginAttemptTracker};
