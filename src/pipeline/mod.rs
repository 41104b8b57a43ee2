/// Anomaly scoring pipeline.
///
/// ```text
/// raw CSVs → features (merge + rolling stats) → scoring (per-meter models)
///          → flags (global threshold + streaks) → report (risk aggregation)
/// ```
///
/// Every step is a pure function over request-scoped data; the only shared
/// input is the read-only artifact registry. One run processes its whole
/// input synchronously start to finish — no retries, no suspension points.

pub mod features;
pub mod flags;
pub mod report;
pub mod scoring;

use chrono::{NaiveDate, Utc};

use crate::artifacts::ArtifactStore;
use crate::model::{
    InspectionRecord, MeterReading, PipelineError, RunMetadata, ScoredRow, WeatherReading,
    MAX_BATCH_RECORDS,
};

/// Everything one scoring run produces.
#[derive(Debug, Clone)]
pub struct InspectionRun {
    pub scored_rows: Vec<ScoredRow>,
    pub records: Vec<InspectionRecord>,
    pub metadata: RunMetadata,
}

/// Runs the full pipeline for one batch of readings.
///
/// Input-size validation happens before any computation: an empty batch or
/// one over the record bound is rejected with no partial results.
pub fn run_inspection(
    readings: &[MeterReading],
    weather: &[WeatherReading],
    start: NaiveDate,
    end: NaiveDate,
    store: &ArtifactStore,
) -> Result<InspectionRun, PipelineError> {
    if readings.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }
    if readings.len() > MAX_BATCH_RECORDS {
        return Err(PipelineError::BatchTooLarge {
            got: readings.len(),
            max: MAX_BATCH_RECORDS,
        });
    }

    let rows = features::build_features(readings, weather, start, end, store.rolling_window_days());
    let mut scored = scoring::score(&rows, store.feature_names(), store)?;

    let threshold = store.anomaly_threshold();
    flags::apply_threshold(&mut scored, threshold);
    let records = report::build_report(&scored, threshold);

    let meter_count = {
        let mut ids: Vec<&str> = scored.iter().map(|r| r.row.meter_id.as_str()).collect();
        ids.dedup(); // rows are sorted by meter
        ids.len()
    };

    let metadata = RunMetadata {
        anomaly_threshold: threshold,
        rolling_window_days: store.rolling_window_days(),
        feature_names: store.feature_names().to_vec(),
        row_count: scored.len(),
        meter_count,
        generated_at: Utc::now(),
    };

    Ok(InspectionRun {
        scored_rows: scored,
        records,
        metadata,
    })
}
