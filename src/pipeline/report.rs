/// Risk aggregation: rolls per-row flags and scores into one inspection
/// record per meter.
///
/// Pure aggregation over the full per-run dataset. Severity normalization
/// is run-relative: re-running with a different meter population shifts
/// every meter's risk score. Output is ordered by meter_id so identical
/// input and threshold reproduce identical records.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{InspectionRecord, RiskLevel, ScoredRow, SEVERITY_EPSILON};
use crate::pipeline::flags;

/// Points added to the risk score per day of the meter's longest streak.
const STREAK_BONUS_PER_DAY: f64 = 5.0;

/// Per-meter aggregates accumulated before normalization.
struct MeterAggregate {
    total_rows: u32,
    total_anomalies: u32,
    worst_score: f64,
    score_sum: f64,
    score_count: u32,
    last_anomaly_date: Option<NaiveDate>,
}

/// Builds one inspection record per meter from scored rows and the global
/// flagging threshold. Deterministic given identical input and threshold.
///
/// Meters whose every row is a coverage gap carry no severity and are
/// excluded — they cannot participate in run-relative normalization.
pub fn build_report(scored_rows: &[ScoredRow], threshold: f64) -> Vec<InspectionRecord> {
    // Apply the threshold on a local copy: build_report must not depend on
    // whether the caller already ran the flagging step.
    let mut rows = scored_rows.to_vec();
    flags::apply_threshold(&mut rows, threshold);
    let streaks = flags::max_streaks(&rows);

    let mut aggregates: BTreeMap<String, MeterAggregate> = BTreeMap::new();
    for scored in &rows {
        let agg = aggregates
            .entry(scored.row.meter_id.clone())
            .or_insert(MeterAggregate {
                total_rows: 0,
                total_anomalies: 0,
                worst_score: f64::INFINITY,
                score_sum: 0.0,
                score_count: 0,
                last_anomaly_date: None,
            });

        agg.total_rows += 1;
        if let Some(score) = scored.anomaly_score {
            agg.score_sum += score;
            agg.score_count += 1;
            if score < agg.worst_score {
                agg.worst_score = score;
            }
        }
        if scored.anomaly_flag {
            agg.total_anomalies += 1;
            agg.last_anomaly_date = match agg.last_anomaly_date {
                Some(prev) if prev >= scored.row.date => Some(prev),
                _ => Some(scored.row.date),
            };
        }
    }

    // Full coverage gaps drop out before normalization.
    aggregates.retain(|_, agg| agg.score_count > 0);
    if aggregates.is_empty() {
        return Vec::new();
    }

    // Run-relative severity bounds: severity = -worst_score, so the most
    // anomalous meter in the run normalizes to 100.
    let severities: Vec<f64> = aggregates.values().map(|a| -a.worst_score).collect();
    let min_severity = severities.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_severity = severities
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);

    let mut records = Vec::with_capacity(aggregates.len());
    for (meter_id, agg) in &aggregates {
        let severity = -agg.worst_score;
        let normalized =
            100.0 * (severity - min_severity) / (max_severity - min_severity + SEVERITY_EPSILON);

        let max_streak_days = streaks.get(meter_id).copied().unwrap_or(0);
        let raw_score = normalized + max_streak_days as f64 * STREAK_BONUS_PER_DAY;
        let risk_score = round1(raw_score.clamp(0.0, 100.0));
        let risk_level = RiskLevel::from_risk_score(risk_score);

        let record = InspectionRecord {
            meter_id: meter_id.clone(),
            total_anomalies: agg.total_anomalies,
            percent_anomalous: agg.total_anomalies as f64 / agg.total_rows as f64,
            worst_score: agg.worst_score,
            avg_score: agg.score_sum / agg.score_count as f64,
            last_anomaly_date: agg.last_anomaly_date,
            max_streak_days,
            risk_score,
            risk_level,
            alert_message: alert_message(
                meter_id,
                risk_level,
                risk_score,
                agg.total_anomalies,
                max_streak_days,
                agg.last_anomaly_date,
            ),
        };
        records.push(record);
    }

    records
}

fn alert_message(
    meter_id: &str,
    level: RiskLevel,
    risk_score: f64,
    total_anomalies: u32,
    max_streak_days: u32,
    last_anomaly_date: Option<NaiveDate>,
) -> String {
    match level {
        RiskLevel::Low => "No immediate inspection required.".to_string(),
        RiskLevel::Medium | RiskLevel::High => {
            let last = last_anomaly_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "ALERT: Meter {} is {} risk (Risk Score: {:.1}). \
                 Anomalous days: {}; Max streak: {} days; Last anomaly: {}. \
                 Recommended for inspection review.",
                meter_id,
                level.as_str(),
                risk_score,
                total_anomalies,
                max_streak_days,
                last
            )
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
