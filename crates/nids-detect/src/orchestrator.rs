//! Detection orchestration
//!
//! Runs all three detectors per packet, independently; no detector's
//! verdict short-circuits another. Locks are taken only for state
//! reads/updates inside each component, never across detector work.

use crate::anomaly::AnomalyScorer;
use crate::classifier::ClassificationScorer;
use crate::scan::ConnectionPatternDetector;
use crate::signatures::SignatureMatcher;
use crate::store::SampleCollector;
use nids_common::{Detection, EngineConfig, PacketRecord};
use nids_flow::FeatureExtractor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LABEL_MALICIOUS: &str = "malicious";
const LABEL_BENIGN: &str = "benign";
const LABELED_BY: &str = "auto_detection";

/// Per-packet analysis with intermediates kept
pub struct PacketAnalysis {
    pub detections: Vec<Detection>,
    pub features: nids_flow::FeatureVector,
    pub classification: Option<crate::classifier::Classification>,
}

/// Per-packet pipeline: signatures, connection patterns, anomaly,
/// classification
pub struct DetectionEngine {
    extractor: Arc<FeatureExtractor>,
    signatures: SignatureMatcher,
    patterns: ConnectionPatternDetector,
    anomaly: AnomalyScorer,
    classifier: ClassificationScorer,
    collector: Option<Arc<dyn SampleCollector>>,
    config: Arc<EngineConfig>,
    retrain_interval: Duration,
    last_retrain: Mutex<Instant>,
}

impl DetectionEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        extractor: Arc<FeatureExtractor>,
        anomaly: AnomalyScorer,
        classifier: ClassificationScorer,
    ) -> Self {
        let patterns = ConnectionPatternDetector::new(
            config.scan_window_packets,
            config.scan_window(),
            config.port_scan_threshold,
            config.flood_threshold,
        );
        Self {
            extractor,
            signatures: SignatureMatcher::new(),
            patterns,
            anomaly,
            classifier,
            collector: None,
            retrain_interval: config.retrain_interval(),
            last_retrain: Mutex::new(Instant::now()),
            config,
        }
    }

    /// Attach the optional training-sample collector
    pub fn with_collector(mut self, collector: Arc<dyn SampleCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Analyze one packet; returns every detection the stages produced
    pub fn analyze(&self, pkt: &PacketRecord) -> Vec<Detection> {
        self.analyze_detailed(pkt).detections
    }

    /// Analyze one packet keeping the intermediate results
    ///
    /// The batch analyzer needs the raw classification outcome for its
    /// risk weighting; live processing only consumes the detections.
    pub fn analyze_detailed(&self, pkt: &PacketRecord) -> PacketAnalysis {
        // Whitelisted traffic stays connection-tracked but skips the
        // detectors entirely
        let features = self.extractor.extract(pkt);

        if self.is_whitelisted(pkt) {
            return PacketAnalysis { detections: Vec::new(), features, classification: None };
        }

        self.anomaly.record(features);

        let mut detections = Vec::new();

        if let Some(det) = self.signatures.match_packet(pkt) {
            if det.rule_id == SignatureMatcher::BRUTE_FORCE_ID {
                self.extractor.logins().record_failed(pkt.src_ip);
            }
            detections.push(det);
        }

        detections.extend(self.patterns.analyze(pkt));

        if let Some(det) = self.anomaly.evaluate(&features) {
            detections.push(det.with_endpoints(pkt.src_ip, pkt.dst_ip, pkt.dst_port));
        }

        let classification = self.classifier.classify(&features.named());
        if let Some(det) = classification
            .as_ref()
            .and_then(|c| self.classifier.detection_from(c))
        {
            detections.push(det.with_endpoints(pkt.src_ip, pkt.dst_ip, pkt.dst_port));
        }

        self.collect_sample(&features, pkt, !detections.is_empty());
        self.maybe_retrain();

        PacketAnalysis { detections, features, classification }
    }

    fn is_whitelisted(&self, pkt: &PacketRecord) -> bool {
        self.config.is_whitelisted_ip(pkt.src_ip)
            || self.config.is_whitelisted_ip(pkt.dst_ip)
            || self.config.is_whitelisted_port(pkt.dst_port)
    }

    /// Best-effort hand-off of the auto-labeled sample
    fn collect_sample(&self, features: &nids_flow::FeatureVector, pkt: &PacketRecord, fired: bool) {
        let Some(collector) = &self.collector else {
            return;
        };
        let (label, confidence) = if fired {
            (LABEL_MALICIOUS, 0.8)
        } else {
            (LABEL_BENIGN, 0.6)
        };
        if let Err(e) = collector.collect(features, pkt, label, LABELED_BY, confidence) {
            tracing::debug!(error = %e, "sample collection skipped");
        }
    }

    /// Wall-clock-gated anomaly retrain, checked per packet but cheap
    fn maybe_retrain(&self) {
        let due = {
            let last = self.last_retrain.lock();
            last.elapsed() >= self.retrain_interval
        };
        if due {
            let mut last = self.last_retrain.lock();
            if last.elapsed() >= self.retrain_interval {
                *last = Instant::now();
                drop(last);
                self.anomaly.retrain();
                tracing::info!("periodic anomaly retrain");
            }
        }
    }

    /// Anomaly scorer handle, for health/model info
    pub fn anomaly(&self) -> &AnomalyScorer {
        &self.anomaly
    }

    /// Classification scorer handle, for health/model info
    pub fn classifier(&self) -> &ClassificationScorer {
        &self.classifier
    }

    /// The shared feature extractor
    pub fn extractor(&self) -> &Arc<FeatureExtractor> {
        &self.extractor
    }
}
