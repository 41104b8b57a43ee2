/// Meter scorer: applies each meter's trained scaler+model pair to produce
/// a continuous anomaly score per row.
///
/// Meters absent from the registry are skipped, not failed: every one of
/// their rows keeps `anomaly_score = None` (a coverage gap). The only error
/// this step can raise is a shape mismatch between the feature list and a
/// trained model's expected feature count.

use crate::artifacts::ArtifactStore;
use crate::model::{FeatureRow, PipelineError, ScoredRow};

/// Scores every row against the per-meter registry.
///
/// Feature values are gathered by the ordered feature-name list from
/// training metadata; a value missing on a row imputes 0.0 before scaling.
/// Input rows are never mutated — the score is carried on a new `ScoredRow`
/// wrapper, flags all initially false (flagging is a separate step).
pub fn score(
    rows: &[FeatureRow],
    features: &[String],
    registry: &ArtifactStore,
) -> Result<Vec<ScoredRow>, PipelineError> {
    let mut scored = Vec::with_capacity(rows.len());

    for row in rows {
        let anomaly_score = match registry.lookup(&row.meter_id) {
            None => None, // Coverage gap: valid skip state.
            Some(artifact) => {
                if artifact.model.weights.len() != features.len() {
                    return Err(PipelineError::ShapeMismatch {
                        meter_id: row.meter_id.clone(),
                        expected: artifact.model.weights.len(),
                        got: features.len(),
                    });
                }

                let x: Vec<f64> = features
                    .iter()
                    .map(|name| row.feature_value(name).unwrap_or(0.0))
                    .collect();
                let x_scaled = artifact.scaler.transform(&x);
                Some(artifact.model.decision(&x_scaled))
            }
        };

        scored.push(ScoredRow {
            row: row.clone(),
            anomaly_score,
            anomaly_flag: false,
        });
    }

    Ok(scored)
}
