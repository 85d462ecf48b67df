//! OpenNIDS Batch Analyzer
//!
//! Offline replay of the decode/feature/detect core over a bounded packet
//! budget, plus flow-level heuristics the live path cannot afford and a
//! composite 0-100 risk score.

mod analyzer;
mod heuristics;
mod report;
mod risk;

pub use analyzer::{BatchAnalyzer, DEFAULT_PACKET_BUDGET};
pub use heuristics::FlowAggregates;
pub use report::{
    AnalysisReport, CaptureWindow, EndpointEdge, Evidence, FlowSample, Metadata, PortCount,
    ProtocolCount, Risk, RiskSource, Summary, TalkerEntry, TimelineBucket,
};
pub use risk::compute_risk;
