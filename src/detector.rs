/// Serving-path detector: the single global scaler+model variant.
///
/// An explicitly constructed, read-only service object wrapping the artifact
/// store. Built once at startup from the registry file and passed into
/// request handlers; it is never mutated after construction, so concurrent
/// requests may share it freely behind an `Arc`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::artifacts::ArtifactStore;
use crate::model::{ArtifactError, PipelineError, RiskLevel, MAX_BATCH_RECORDS};

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "logistic_regression";

/// Classification threshold used when a request does not supply one.
pub const DEFAULT_PREDICT_THRESHOLD: f64 = 0.5;

/// One input record for the serving path: an optional meter id plus the
/// feature columns, keyed by exact column name.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRecord {
    #[serde(default)]
    pub meter_id: Option<String>,
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
}

/// One serving-path result row.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub meter_id: Option<String>,
    pub prediction: u8,
    pub fraud_probability: f64,
    pub risk_level: RiskLevel,
}

/// Read-only detector state, health-checkable via `is_ready`.
pub struct Detector {
    store: ArtifactStore,
    loaded_at: DateTime<Utc>,
}

impl Detector {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            loaded_at: Utc::now(),
        }
    }

    /// Loads the detector from the registry file. Any `ArtifactError` here
    /// is fatal: the caller must refuse to start serving.
    pub fn load(path: &str) -> Result<Self, ArtifactError> {
        Ok(Self::new(ArtifactStore::load(path)?))
    }

    /// A constructed detector is always ready — artifacts were validated at
    /// load time and never change afterwards.
    pub fn is_ready(&self) -> bool {
        true
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Runs the named global model over every record, returning binary
    /// labels and fraud probabilities in input order.
    ///
    /// Rejected before any model is invoked when the batch is empty or over
    /// the record bound, the model name is unknown, or any declared required
    /// feature column is absent — the error names exactly the missing
    /// columns.
    pub fn predict(
        &self,
        records: &[PredictRecord],
        model_choice: &str,
    ) -> Result<(Vec<u8>, Vec<f64>), PipelineError> {
        self.validate_batch(records)?;

        let Some(model) = self.store.global_model(model_choice) else {
            return Err(PipelineError::UnknownModel(model_choice.to_string()));
        };

        let features = self.store.feature_names();
        let mut missing: Vec<String> = features
            .iter()
            .filter(|name| records.iter().any(|r| !r.features.contains_key(*name)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(PipelineError::MissingFeatures(missing));
        }

        let mut labels = Vec::with_capacity(records.len());
        let mut probabilities = Vec::with_capacity(records.len());
        for record in records {
            let x: Vec<f64> = features
                .iter()
                .map(|name| record.features[name])
                .collect();
            let x_scaled = model.scaler.transform(&x);
            let probability = model.predict_proba(&x_scaled);
            labels.push(if probability >= DEFAULT_PREDICT_THRESHOLD {
                1
            } else {
                0
            });
            probabilities.push(probability);
        }

        Ok((labels, probabilities))
    }

    /// Scores a batch and attaches per-record risk levels, relabeling with
    /// the request's classification threshold.
    pub fn predict_batch(
        &self,
        records: &[PredictRecord],
        model_choice: &str,
        threshold: f64,
    ) -> Result<Vec<Prediction>, PipelineError> {
        let (_, probabilities) = self.predict(records, model_choice)?;

        Ok(records
            .iter()
            .zip(probabilities)
            .map(|(record, probability)| Prediction {
                meter_id: record.meter_id.clone(),
                prediction: if probability >= threshold { 1 } else { 0 },
                fraud_probability: probability,
                risk_level: risk_level_from_probability(probability),
            })
            .collect())
    }

    /// Metadata about the loaded artifacts, for the /model_info endpoint.
    pub fn model_info(&self) -> serde_json::Value {
        let metadata = self.store.metadata();
        serde_json::json!({
            "models": self.store.global_model_names(),
            "per_meter_models": self.store.meter_count(),
            "feature_count": self.store.feature_count(),
            "features": metadata.feature_names,
            "rolling_window_days": metadata.rolling_window_days,
            "anomaly_threshold": metadata.anomaly_threshold,
            "trained_at": metadata.trained_at,
            "loaded_at": self.loaded_at.to_rfc3339(),
        })
    }

    fn validate_batch(&self, records: &[PredictRecord]) -> Result<(), PipelineError> {
        if records.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        if records.len() > MAX_BATCH_RECORDS {
            return Err(PipelineError::BatchTooLarge {
                got: records.len(),
                max: MAX_BATCH_RECORDS,
            });
        }
        Ok(())
    }
}

/// Probability bins from the training configuration:
/// [0, 0.3] → Low, (0.3, 0.7] → Medium, (0.7, 1.0] → High.
fn risk_level_from_probability(probability: f64) -> RiskLevel {
    if probability > 0.7 {
        RiskLevel::High
    } else if probability > 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
