//! Self-training anomaly scoring
//!
//! State machine: Untrained -> Collecting -> Trained. Samples accumulate in
//! a bounded buffer; once `min_samples` are present the model fits a
//! per-dimension standard scaler and a mean-|z| cutoff, persists a
//! snapshot, and starts scoring. A periodic retrain refits on the latest
//! buffer contents to follow drift.
//!
//! The decision-score-to-confidence transform (|decision| clamped to
//! [0, 1]) is an uncalibrated heuristic kept for parity with the trained
//! pipeline; see `heuristic_confidence`.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use nids_common::{Detection, DetectionKind, NidsError, Result, Severity};
use nids_flow::FeatureVector;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

const SOURCE: &str = "anomaly_scorer";

/// Mean-|z| beyond which a sample is anomalous
const Z_CUTOFF: f64 = 3.0;

/// Floor for per-dimension standard deviation
const STD_FLOOR: f64 = 1e-6;

/// Bounded sample buffer size
const BUFFER_CAP: usize = 10_000;

/// Severity switches from Medium to High at this confidence
const HIGH_SEVERITY_CONFIDENCE: f64 = 0.8;

/// Training state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyState {
    Untrained,
    Collecting,
    Trained,
}

/// Scoring result for one vector
#[derive(Debug, Clone, Copy)]
pub struct AnomalyScore {
    pub is_anomaly: bool,
    pub confidence: f64,
    /// Signed distance from the cutoff; negative is anomalous
    pub decision: f64,
}

/// Persistable fitted-model state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyModelSnapshot {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub cutoff: f64,
    pub samples: usize,
    pub trained_at: DateTime<Utc>,
}

/// Where trained models go; wired to the model registry in production
pub trait ModelSink: Send + Sync {
    fn persist(&self, snapshot: &AnomalyModelSnapshot) -> Result<()>;
}

/// JSON-on-disk sink
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelSink for FileSink {
    fn persist(&self, snapshot: &AnomalyModelSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| NidsError::Store(format!("model snapshot: {e}")))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

struct FittedModel {
    means: Array1<f64>,
    stds: Array1<f64>,
    samples: usize,
}

impl FittedModel {
    /// Signed distance from the cutoff; negative means anomalous
    fn decision(&self, v: &FeatureVector) -> f64 {
        let x = Array1::from_iter(v.as_slice().iter().copied());
        let z = (&x - &self.means) / &self.stds;
        let mean_abs_z = z.mapv(f64::abs).mean().unwrap_or(0.0);
        Z_CUTOFF - mean_abs_z
    }
}

/// Unsupervised density scorer over feature history
pub struct AnomalyScorer {
    min_samples: usize,
    threshold: f64,
    buffer: Mutex<VecDeque<FeatureVector>>,
    model: RwLock<Option<FittedModel>>,
    sink: Option<Arc<dyn ModelSink>>,
}

impl AnomalyScorer {
    pub fn new(min_samples: usize, threshold: f64) -> Self {
        Self {
            min_samples: min_samples.max(2),
            threshold,
            buffer: Mutex::new(VecDeque::with_capacity(1024)),
            model: RwLock::new(None),
            sink: None,
        }
    }

    /// Attach a sink that receives every fitted model
    pub fn with_sink(mut self, sink: Arc<dyn ModelSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Current state
    pub fn state(&self) -> AnomalyState {
        if self.model.read().is_some() {
            AnomalyState::Trained
        } else if self.buffer.lock().is_empty() {
            AnomalyState::Untrained
        } else {
            AnomalyState::Collecting
        }
    }

    /// Buffer a sample; fits and persists once the threshold is reached
    pub fn record(&self, v: FeatureVector) {
        let should_train = {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= BUFFER_CAP {
                buffer.pop_front();
            }
            buffer.push_back(v);
            self.model.read().is_none() && buffer.len() >= self.min_samples
        };
        if should_train {
            self.fit();
        }
    }

    /// Refit on the latest buffer contents; no-op below `min_samples`
    pub fn retrain(&self) {
        if self.buffer.lock().len() >= self.min_samples {
            self.fit();
        }
    }

    fn fit(&self) {
        let samples: Vec<FeatureVector> = self.buffer.lock().iter().copied().collect();
        let n = samples.len();
        if n < 2 {
            return;
        }
        let flat: Vec<f64> = samples.iter().flat_map(|v| v.as_slice().to_vec()).collect();
        let Ok(matrix) = Array2::from_shape_vec((n, 6), flat) else {
            tracing::warn!(samples = n, "anomaly fit skipped: shape mismatch");
            return;
        };

        let means = matrix.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(6));
        let stds = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < STD_FLOOR { STD_FLOOR } else { s });

        let fitted = FittedModel { means, stds, samples: n };
        let snapshot = AnomalyModelSnapshot {
            means: fitted.means.to_vec(),
            stds: fitted.stds.to_vec(),
            cutoff: Z_CUTOFF,
            samples: n,
            trained_at: Utc::now(),
        };

        *self.model.write() = Some(fitted);
        tracing::info!(samples = n, "anomaly model trained");

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(&snapshot) {
                tracing::warn!(error = %e, "anomaly model persist failed");
            }
        }
    }

    /// Score a vector; `None` until the model is trained
    pub fn score(&self, v: &FeatureVector) -> Option<AnomalyScore> {
        let model = self.model.read();
        let model = model.as_ref()?;
        let decision = model.decision(v);
        Some(AnomalyScore {
            is_anomaly: decision < 0.0,
            confidence: heuristic_confidence(decision),
            decision,
        })
    }

    /// Score and gate into a Detection per the confidence threshold
    pub fn evaluate(&self, v: &FeatureVector) -> Option<Detection> {
        let score = self.score(v)?;
        if !score.is_anomaly || score.confidence <= self.threshold {
            return None;
        }
        let severity = if score.confidence < HIGH_SEVERITY_CONFIDENCE {
            Severity::Medium
        } else {
            Severity::High
        };
        Some(Detection::new(
            DetectionKind::Anomaly,
            "traffic_anomaly",
            severity,
            score.confidence,
            format!(
                "feature vector deviates from learned baseline (decision {:.3})",
                score.decision
            ),
            SOURCE,
        ))
    }

    /// Number of buffered samples
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Samples the current model was fitted on, when trained
    pub fn trained_on(&self) -> Option<usize> {
        self.model.read().as_ref().map(|m| m.samples)
    }
}

/// Decision score to confidence: |decision| clamped to [0, 1]
///
/// Uncalibrated: this conflates distance-from-cutoff with probability.
/// The downstream thresholds were tuned against it, so it stays.
pub fn heuristic_confidence(decision: f64) -> f64 {
    decision.abs().clamp(0.0, 1.0)
}
