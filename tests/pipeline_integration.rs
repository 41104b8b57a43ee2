/// Integration tests for the full scoring pipeline
///
/// These tests drive the complete chain over realistic inputs:
/// 1. Parse meter and weather files
/// 2. Build feature rows (merge, rolling stats, standardized residuals)
/// 3. Apply per-meter models and the global anomaly threshold
/// 4. Aggregate per-meter risk into inspection records
///
/// All inputs come from the crate's test fixtures; no network, no database.
///
/// Run with: cargo test --test pipeline_integration

use chrono::NaiveDate;

use gridwatch_service::artifacts::ArtifactStore;
use gridwatch_service::ingest::fixtures::{
    fixture_meter_csv, fixture_registry_toml, fixture_weather_csv,
};
use gridwatch_service::ingest::readings::{parse_meter_csv, parse_weather_csv};
use gridwatch_service::model::{MeterReading, PipelineError, RiskLevel, MAX_BATCH_RECORDS};
use gridwatch_service::pipeline::{run_inspection, InspectionRun};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn fixture_store() -> ArtifactStore {
    ArtifactStore::from_toml_str(fixture_registry_toml()).expect("fixture registry should load")
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).expect("valid fixture date")
}

fn fixture_run() -> InspectionRun {
    let readings = parse_meter_csv(fixture_meter_csv()).expect("fixture meter file parses");
    let weather = parse_weather_csv(fixture_weather_csv()).expect("fixture weather file parses");
    run_inspection(&readings, &weather, march(1), march(31), &fixture_store())
        .expect("fixture run should succeed")
}

// ---------------------------------------------------------------------------
// 1. End-to-End Scoring
// ---------------------------------------------------------------------------

#[test]
fn test_full_chain_scores_every_covered_row() {
    let run = fixture_run();

    // Two meters, four days each, all within the analysis window.
    assert_eq!(run.scored_rows.len(), 8, "all fixture rows should survive the merge");
    assert!(
        run.scored_rows.iter().all(|r| r.anomaly_score.is_some()),
        "both fixture meters have trained models, so no coverage gaps"
    );
    assert_eq!(run.metadata.meter_count, 2);
}

#[test]
fn test_consumption_spike_is_flagged() {
    let run = fixture_run();

    // MTR-001 jumps from ~10 kWh to 46 kWh on day 4.
    let spike_day = run
        .scored_rows
        .iter()
        .find(|r| r.row.meter_id == "MTR-001" && r.row.date == march(4))
        .expect("spike row should be present");
    assert!(
        spike_day.anomaly_flag,
        "the consumption spike should score below threshold and be flagged"
    );

    let quiet_days = run
        .scored_rows
        .iter()
        .filter(|r| r.row.meter_id == "MTR-001" && r.row.date < march(4));
    for day in quiet_days {
        assert!(!day.anomaly_flag, "steady days should not be flagged");
    }
}

#[test]
fn test_flat_meter_is_never_flagged() {
    let run = fixture_run();
    assert!(
        run.scored_rows
            .iter()
            .filter(|r| r.row.meter_id == "MTR-002")
            .all(|r| !r.anomaly_flag),
        "a meter with flat consumption should produce no flags"
    );
}

#[test]
fn test_rows_carry_merged_weather_features() {
    let run = fixture_run();
    for scored in &run.scored_rows {
        assert!(
            scored.row.features.contains_key("temp_mean_c"),
            "every surviving row must carry its joined weather columns"
        );
        assert!(
            scored.row.features.contains_key("spike_count"),
            "extra engineered meter columns must be carried through"
        );
    }
}

// ---------------------------------------------------------------------------
// 2. Inspection Report
// ---------------------------------------------------------------------------

#[test]
fn test_report_ranks_spiking_meter_above_flat_meter() {
    let run = fixture_run();
    assert_eq!(run.records.len(), 2);

    let spiker = run
        .records
        .iter()
        .find(|r| r.meter_id == "MTR-001")
        .expect("MTR-001 should be reported");
    let flat = run
        .records
        .iter()
        .find(|r| r.meter_id == "MTR-002")
        .expect("MTR-002 should be reported");

    assert!(spiker.risk_score > flat.risk_score);
    assert_eq!(spiker.total_anomalies, 1);
    assert_eq!(spiker.last_anomaly_date, Some(march(4)));
    assert_eq!(flat.total_anomalies, 0);
    assert_eq!(flat.risk_level, RiskLevel::Low);
}

#[test]
fn test_risk_scores_stay_in_bounds() {
    let run = fixture_run();
    for record in &run.records {
        assert!(
            (0.0..=100.0).contains(&record.risk_score),
            "risk score {} for {} out of bounds",
            record.risk_score,
            record.meter_id
        );
        assert!((0.0..=1.0).contains(&record.percent_anomalous));
        // One decimal place of precision.
        assert!((record.risk_score * 10.0).fract().abs() < 1e-9);
    }
}

#[test]
fn test_report_is_deterministic_across_runs() {
    let first = fixture_run();
    let second = fixture_run();

    // generated_at differs; everything derived from the data must not.
    assert_eq!(first.records, second.records);
    assert_eq!(first.scored_rows, second.scored_rows);
}

// ---------------------------------------------------------------------------
// 3. Coverage Gaps and Window Filtering
// ---------------------------------------------------------------------------

#[test]
fn test_unmodeled_meter_is_skipped_not_failed() {
    let mut readings = parse_meter_csv(fixture_meter_csv()).unwrap();
    for day in 1..=4 {
        readings.push(MeterReading {
            meter_id: "MTR-UNSEEN".to_string(),
            date: march(day),
            daily_mean_power: 99.0,
            extra: [("spike_count".to_string(), 0.0)].into(),
        });
    }
    let weather = parse_weather_csv(fixture_weather_csv()).unwrap();

    let run = run_inspection(&readings, &weather, march(1), march(31), &fixture_store())
        .expect("an unmodeled meter must not fail the whole batch");

    let unseen: Vec<_> = run
        .scored_rows
        .iter()
        .filter(|r| r.row.meter_id == "MTR-UNSEEN")
        .collect();
    assert_eq!(unseen.len(), 4, "unmodeled rows still get feature-built");
    assert!(
        unseen.iter().all(|r| r.anomaly_score.is_none() && !r.anomaly_flag),
        "unmodeled rows carry no score and are never flagged"
    );
    assert!(
        run.records.iter().all(|r| r.meter_id != "MTR-UNSEEN"),
        "meters with no scores at all are excluded from the report"
    );
}

#[test]
fn test_rows_outside_window_are_dropped() {
    let readings = parse_meter_csv(fixture_meter_csv()).unwrap();
    let weather = parse_weather_csv(fixture_weather_csv()).unwrap();

    // Window covers only the first two fixture days.
    let run = run_inspection(&readings, &weather, march(1), march(2), &fixture_store()).unwrap();
    assert_eq!(run.scored_rows.len(), 4);
    assert!(run.scored_rows.iter().all(|r| r.row.date <= march(2)));
}

#[test]
fn test_days_without_weather_are_dropped() {
    let readings = parse_meter_csv(fixture_meter_csv()).unwrap();
    // Weather for the first three days only.
    let weather_text = "date,temp_mean_c,temp_min_c\n\
                        2026-03-01,18.0,11.0\n\
                        2026-03-02,18.5,11.5\n\
                        2026-03-03,17.5,10.0\n";
    let weather = parse_weather_csv(weather_text).unwrap();

    let run = run_inspection(&readings, &weather, march(1), march(31), &fixture_store()).unwrap();
    assert_eq!(run.scored_rows.len(), 6, "day 4 rows should drop with no join match");
    assert!(run.scored_rows.iter().all(|r| r.row.date <= march(3)));
}

// ---------------------------------------------------------------------------
// 4. Batch Validation
// ---------------------------------------------------------------------------

#[test]
fn test_empty_batch_is_rejected() {
    let weather = parse_weather_csv(fixture_weather_csv()).unwrap();
    let result = run_inspection(&[], &weather, march(1), march(31), &fixture_store());
    assert_eq!(result.err(), Some(PipelineError::EmptyBatch));
}

#[test]
fn test_oversized_batch_is_rejected_before_compute() {
    let readings: Vec<MeterReading> = (0..=MAX_BATCH_RECORDS)
        .map(|i| MeterReading {
            meter_id: format!("MTR-{:05}", i),
            date: march(1),
            daily_mean_power: 10.0,
            extra: Default::default(),
        })
        .collect();
    let result = run_inspection(&readings, &[], march(1), march(31), &fixture_store());
    assert!(matches!(result, Err(PipelineError::BatchTooLarge { .. })));
}
