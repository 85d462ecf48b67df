//! Supervised classification scoring
//!
//! The model itself is pluggable; this module owns the inference contract
//! and the schema reconciliation between whatever the model was trained on
//! and what live extraction produces.

use nids_common::{Detection, DetectionKind, NidsError, Result, Severity};
use nids_flow::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const SOURCE: &str = "classification_scorer";

/// Severity switches from Medium to High above this confidence
const HIGH_SEVERITY_CONFIDENCE: f64 = 0.9;

/// Binary label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Benign,
    Malicious,
}

/// Feature schema a model was trained on, resolved once at load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub names: Vec<String>,
    pub expected_len: usize,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        let expected_len = names.len();
        Self { names, expected_len }
    }

    /// Reconcile a named-feature map into schema order
    ///
    /// Missing names default to 0.0; extra entries are dropped; the result
    /// is always exactly `expected_len` long.
    pub fn reconcile(&self, named: &HashMap<String, f64>) -> Vec<f64> {
        let mut out = vec![0.0; self.expected_len];
        for (i, slot) in out.iter_mut().enumerate() {
            if let Some(name) = self.names.get(i) {
                *slot = named.get(name).copied().unwrap_or(0.0);
            }
        }
        out
    }
}

/// Classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    pub confidence: f64,
    /// [p_benign, p_malicious]
    pub probabilities: [f64; 2],
}

/// Pluggable binary model: benign = index 0, malicious = index 1
pub trait BinaryClassifier: Send + Sync {
    fn is_trained(&self) -> bool;
    fn schema(&self) -> &FeatureSchema;
    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]>;
}

/// Serialized form of a [`LinearModel`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearModelExport {
    weights: Vec<f64>,
    bias: f64,
    feature_names: Vec<String>,
}

/// Logistic model loadable from a JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LinearModelExport")]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub feature_names: Vec<String>,
    #[serde(skip_serializing)]
    schema: FeatureSchema,
}

impl TryFrom<LinearModelExport> for LinearModel {
    type Error = NidsError;

    fn try_from(export: LinearModelExport) -> Result<Self> {
        Self::new(export.weights, export.bias, export.feature_names)
    }
}

impl LinearModel {
    pub fn new(weights: Vec<f64>, bias: f64, feature_names: Vec<String>) -> Result<Self> {
        if weights.len() != feature_names.len() {
            return Err(NidsError::ModelUnavailable(format!(
                "weight count {} does not match schema size {}",
                weights.len(),
                feature_names.len()
            )));
        }
        let schema = FeatureSchema::new(feature_names.clone());
        Ok(Self { weights, bias, feature_names, schema })
    }

    /// Load an exported model file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|e| NidsError::ModelUnavailable(format!("model parse: {e}")))
    }
}

impl BinaryClassifier for LinearModel {
    fn is_trained(&self) -> bool {
        !self.weights.is_empty()
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        if features.len() != self.weights.len() {
            return Err(NidsError::ModelUnavailable(format!(
                "feature length {} does not match model {}",
                features.len(),
                self.weights.len()
            )));
        }
        let logit: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        let p = 1.0 / (1.0 + (-logit).exp());
        Ok([1.0 - p, p])
    }
}

/// Summary of the loaded model for health endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub loaded: bool,
    pub trained: bool,
    pub expected_len: usize,
    pub names: Vec<String>,
}

/// Wraps an optional model behind the confidence gate
pub struct ClassificationScorer {
    model: Option<Arc<dyn BinaryClassifier>>,
    threshold: f64,
}

impl ClassificationScorer {
    pub fn new(model: Option<Arc<dyn BinaryClassifier>>, threshold: f64) -> Self {
        Self { model, threshold }
    }

    /// No model, or a model that is not trained, means no detections
    pub fn disabled() -> Self {
        Self { model: None, threshold: 0.7 }
    }

    /// Classify a named-feature map; `None` when no usable model
    pub fn classify(&self, named: &HashMap<String, f64>) -> Option<Classification> {
        let model = self.model.as_ref()?;
        if !model.is_trained() {
            return None;
        }
        let features = model.schema().reconcile(named);
        match model.predict_proba(&features) {
            Ok(probabilities) => {
                let (label, confidence) = if probabilities[1] >= probabilities[0] {
                    (Label::Malicious, probabilities[1])
                } else {
                    (Label::Benign, probabilities[0])
                };
                Some(Classification { label, confidence, probabilities })
            }
            Err(e) => {
                tracing::warn!(error = %e, "classifier prediction failed");
                None
            }
        }
    }

    /// Gate an existing classification into a Detection
    pub fn detection_from(&self, result: &Classification) -> Option<Detection> {
        if result.label != Label::Malicious || result.confidence < self.threshold {
            return None;
        }
        let severity = if result.confidence > HIGH_SEVERITY_CONFIDENCE {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(Detection::new(
            DetectionKind::Classification,
            "ml_classification",
            severity,
            result.confidence,
            format!(
                "classifier marked traffic malicious (p={:.3})",
                result.probabilities[1]
            ),
            SOURCE,
        ))
    }

    /// Classify a feature vector and gate it in one step
    pub fn evaluate(&self, v: &FeatureVector) -> Option<Detection> {
        self.classify(&v.named())
            .and_then(|result| self.detection_from(&result))
    }

    /// Model status for health reporting
    pub fn model_info(&self) -> ModelInfo {
        match &self.model {
            Some(model) => ModelInfo {
                loaded: true,
                trained: model.is_trained(),
                expected_len: model.schema().expected_len,
                names: model.schema().names.clone(),
            },
            None => ModelInfo { loaded: false, trained: false, expected_len: 0, names: Vec::new() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nids_flow::FEATURE_NAMES;

    fn names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    /// Weights that mark large failed-login counts as malicious
    fn model() -> Arc<LinearModel> {
        Arc::new(
            LinearModel::new(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0], -4.0, names()).unwrap(),
        )
    }

    #[test]
    fn test_reconcile_pads_missing() {
        let schema = FeatureSchema::new(names());
        let mut named = HashMap::new();
        named.insert("packet_size".to_string(), 100.0);
        let out = schema.reconcile(&named);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], 100.0);
        assert_eq!(out[3], 0.0);
    }

    #[test]
    fn test_reconcile_drops_extras() {
        let schema = FeatureSchema::new(names());
        let mut named = HashMap::new();
        for i in 0..20 {
            named.insert(format!("bogus_{i}"), 1.0);
        }
        named.insert("protocol_type".to_string(), 2.0);
        let out = schema.reconcile(&named);
        assert_eq!(out.len(), 6);
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_malicious_classification() {
        let scorer = ClassificationScorer::new(Some(model()), 0.7);
        let mut named = HashMap::new();
        named.insert("failed_login_attempts".to_string(), 5.0);
        let result = scorer.classify(&named).unwrap();
        assert_eq!(result.label, Label::Malicious);
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_benign_below_threshold() {
        let scorer = ClassificationScorer::new(Some(model()), 0.7);
        let v = FeatureVector::from([100.0, 1.0, 0.5, 0.0, 10.0, 0.1]);
        assert!(scorer.evaluate(&v).is_none());
    }

    #[test]
    fn test_detection_severity_tracks_confidence() {
        let scorer = ClassificationScorer::new(Some(model()), 0.7);
        let v = FeatureVector::from([0.0, 0.0, 0.0, 10.0, 0.0, 0.0]);
        let det = scorer.evaluate(&v).unwrap();
        assert_eq!(det.kind, DetectionKind::Classification);
        assert_eq!(det.severity, Severity::High);
    }

    #[test]
    fn test_no_model_is_silent() {
        let scorer = ClassificationScorer::disabled();
        let v = FeatureVector::from([0.0, 0.0, 0.0, 10.0, 0.0, 0.0]);
        assert!(scorer.evaluate(&v).is_none());
        assert!(!scorer.model_info().loaded);
    }

    #[test]
    fn test_model_rejects_mismatched_weights() {
        assert!(LinearModel::new(vec![1.0, 2.0], 0.0, names()).is_err());
    }

    #[test]
    fn test_model_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = LinearModel::new(vec![0.1; 6], -1.0, names()).unwrap();
        std::fs::write(&path, serde_json::to_vec(&model).unwrap()).unwrap();

        let loaded = LinearModel::load(&path).unwrap();
        assert!(loaded.is_trained());
        assert_eq!(loaded.schema().expected_len, 6);
    }
}
