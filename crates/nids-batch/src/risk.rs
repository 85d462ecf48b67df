//! Composite risk scoring
//!
//! Preference order: classifier confidences, then severity weights, then an
//! explicit "unavailable" result. A score is never invented.

use crate::report::{Risk, RiskSource};
use nids_common::Detection;
use nids_detect::{Classification, Label};

/// Relative weights of the classifier-based score
const W_MAX: f64 = 0.60;
const W_AVG: f64 = 0.25;
const W_RATIO: f64 = 0.15;

/// Floor applied when any detection exists under the severity fallback
const SEVERITY_FLOOR: f64 = 10.0;

pub fn compute_risk(detections: &[Detection], classifications: &[Classification]) -> Risk {
    if !classifications.is_empty() {
        return classifier_risk(classifications);
    }
    if !detections.is_empty() {
        return severity_risk(detections);
    }
    Risk {
        score: 0.0,
        level: level_for(0.0).to_string(),
        rationale: "no classifier output and no detections".into(),
        risk_source: RiskSource::Unavailable,
    }
}

fn classifier_risk(classifications: &[Classification]) -> Risk {
    let malicious: Vec<f64> = classifications
        .iter()
        .map(|c| c.probabilities[1])
        .collect();
    let max = malicious.iter().copied().fold(0.0, f64::max);
    let avg = malicious.iter().sum::<f64>() / malicious.len() as f64;
    let ratio = classifications
        .iter()
        .filter(|c| c.label == Label::Malicious)
        .count() as f64
        / classifications.len() as f64;

    let score = (100.0 * (W_MAX * max + W_AVG * avg + W_RATIO * ratio.min(1.0))).min(100.0);
    Risk {
        score,
        level: level_for(score).to_string(),
        rationale: format!(
            "classifier over {} samples: max {:.2}, avg {:.2}, malicious ratio {:.2}",
            classifications.len(),
            max,
            avg,
            ratio
        ),
        risk_source: RiskSource::Classifier,
    }
}

fn severity_risk(detections: &[Detection]) -> Risk {
    let sum: f64 = detections.iter().map(|d| d.severity.risk_weight()).sum();
    let score = sum.min(100.0).max(SEVERITY_FLOOR);
    Risk {
        score,
        level: level_for(score).to_string(),
        rationale: format!(
            "severity-weighted sum over {} detections (classifier unavailable)",
            detections.len()
        ),
        risk_source: RiskSource::SeverityWeighted,
    }
}

fn level_for(score: f64) -> &'static str {
    if score < 25.0 {
        "low"
    } else if score < 50.0 {
        "medium"
    } else if score < 75.0 {
        "high"
    } else {
        "critical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nids_common::{DetectionKind, Severity};

    fn detection(severity: Severity) -> Detection {
        Detection::new(
            DetectionKind::Heuristic,
            "port_scan",
            severity,
            0.8,
            "test",
            "flow_heuristics",
        )
    }

    fn classification(p_malicious: f64) -> Classification {
        let label = if p_malicious >= 0.5 { Label::Malicious } else { Label::Benign };
        Classification {
            label,
            confidence: p_malicious.max(1.0 - p_malicious),
            probabilities: [1.0 - p_malicious, p_malicious],
        }
    }

    #[test]
    fn test_unavailable_when_nothing_to_score() {
        let risk = compute_risk(&[], &[]);
        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.level, "low");
        assert_eq!(risk.risk_source, RiskSource::Unavailable);
    }

    #[test]
    fn test_severity_fallback_floor() {
        let risk = compute_risk(&[detection(Severity::Low)], &[]);
        assert_eq!(risk.risk_source, RiskSource::SeverityWeighted);
        assert_eq!(risk.score, 10.0);
    }

    #[test]
    fn test_severity_fallback_caps_at_100() {
        let many: Vec<Detection> = (0..10).map(|_| detection(Severity::Critical)).collect();
        let risk = compute_risk(&many, &[]);
        assert_eq!(risk.score, 100.0);
        assert_eq!(risk.level, "critical");
    }

    #[test]
    fn test_classifier_weighting() {
        let classifications = vec![classification(0.9), classification(0.1)];
        let risk = compute_risk(&[], &classifications);
        assert_eq!(risk.risk_source, RiskSource::Classifier);
        // 0.6*0.9 + 0.25*0.5 + 0.15*0.5 = 0.74
        assert!((risk.score - 74.0).abs() < 0.01);
        assert_eq!(risk.level, "high");
    }

    #[test]
    fn test_classifier_outranks_severity() {
        let classifications = vec![classification(0.05)];
        let risk = compute_risk(&[detection(Severity::Critical)], &classifications);
        assert_eq!(risk.risk_source, RiskSource::Classifier);
        assert!(risk.score < 10.0);
    }

    #[test]
    fn test_levels() {
        assert_eq!(level_for(0.0), "low");
        assert_eq!(level_for(30.0), "medium");
        assert_eq!(level_for(60.0), "high");
        assert_eq!(level_for(90.0), "critical");
    }
}
