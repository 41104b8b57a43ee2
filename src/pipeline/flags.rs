/// Flagging and streak detection.
///
/// Converts continuous anomaly scores to binary flags with a single global
/// threshold (score <= T ⇒ flagged), then finds each meter's longest run of
/// consecutive flagged rows in date order via an explicit linear scan.
///
/// A calendar gap with no row at all does not break a streak — no gap
/// filling happens anywhere in the pipeline, so only an explicit unflagged
/// row interrupts a run.

use std::collections::BTreeMap;

use crate::model::ScoredRow;

/// Sets `anomaly_flag` on every row carrying a score. Coverage-gap rows
/// (no score) are excluded from flagging and stay false.
pub fn apply_threshold(rows: &mut [ScoredRow], threshold: f64) {
    for row in rows.iter_mut() {
        row.anomaly_flag = match row.anomaly_score {
            Some(score) => score <= threshold,
            None => false,
        };
    }
}

/// Longest run of consecutive flagged rows per meter, in date order.
///
/// Rows must be sorted by (meter_id, date) — the feature builder's output
/// order. Meters with zero flagged rows map to 0; meters with no rows at
/// all never appear.
pub fn max_streaks(rows: &[ScoredRow]) -> BTreeMap<String, u32> {
    let mut streaks: BTreeMap<String, u32> = BTreeMap::new();
    let mut current_meter: Option<&str> = None;
    let mut run = 0u32;

    for scored in rows {
        let meter_id = scored.row.meter_id.as_str();
        if current_meter != Some(meter_id) {
            current_meter = Some(meter_id);
            run = 0;
            streaks.entry(meter_id.to_string()).or_insert(0);
        }

        if scored.anomaly_flag {
            run += 1;
            let best = streaks.get_mut(meter_id).expect("entry inserted above");
            if run > *best {
                *best = run;
            }
        } else {
            run = 0;
        }
    }

    streaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureRow;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn scored(meter: &str, day: u32, score: Option<f64>) -> ScoredRow {
        ScoredRow {
            row: FeatureRow {
                meter_id: meter.to_string(),
                date: NaiveDate::from_ymd_opt(2026, 4, day).unwrap(),
                daily_mean_power: 10.0,
                features: BTreeMap::new(),
                rolling_mean: 10.0,
                rolling_std: 1.0,
                residual: 0.0,
                z_score: 0.0,
            },
            anomaly_score: score,
            anomaly_flag: false,
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut rows = vec![
            scored("MTR-001", 1, Some(-0.5)),
            scored("MTR-001", 2, Some(-0.49)),
        ];
        apply_threshold(&mut rows, -0.5);

        assert!(rows[0].anomaly_flag, "score equal to threshold is flagged");
        assert!(!rows[1].anomaly_flag);
    }

    #[test]
    fn test_coverage_gap_rows_never_flagged() {
        let mut rows = vec![scored("MTR-GAP", 1, None)];
        apply_threshold(&mut rows, 100.0);
        assert!(!rows[0].anomaly_flag);
    }

    #[test]
    fn test_two_day_streak_then_reset() {
        // rows = [(meterA, day1, -0.9), (meterA, day2, -0.8), (meterA, day3, 0.1)]
        // threshold = -0.5 ⇒ flags [1, 1, 0]; max streak 2.
        let mut rows = vec![
            scored("MTR-A", 1, Some(-0.9)),
            scored("MTR-A", 2, Some(-0.8)),
            scored("MTR-A", 3, Some(0.1)),
        ];
        apply_threshold(&mut rows, -0.5);

        let flags: Vec<bool> = rows.iter().map(|r| r.anomaly_flag).collect();
        assert_eq!(flags, vec![true, true, false]);

        let streaks = max_streaks(&rows);
        assert_eq!(streaks.get("MTR-A"), Some(&2));
    }

    #[test]
    fn test_unflagged_row_breaks_streak_but_date_gap_does_not() {
        let mut rows = vec![
            scored("MTR-A", 1, Some(-0.9)),
            // days 2-4 have no rows at all: the run continues across the gap
            scored("MTR-A", 5, Some(-0.9)),
            scored("MTR-A", 6, Some(0.2)), // explicit unflagged row: run resets
            scored("MTR-A", 7, Some(-0.9)),
        ];
        apply_threshold(&mut rows, -0.5);
        let streaks = max_streaks(&rows);
        assert_eq!(streaks.get("MTR-A"), Some(&2));
    }

    #[test]
    fn test_zero_flagged_rows_gives_zero_streak() {
        let mut rows = vec![scored("MTR-B", 1, Some(0.4)), scored("MTR-B", 2, Some(0.3))];
        apply_threshold(&mut rows, -0.5);
        let streaks = max_streaks(&rows);
        assert_eq!(streaks.get("MTR-B"), Some(&0));
    }

    #[test]
    fn test_streaks_do_not_leak_across_meters() {
        let mut rows = vec![
            scored("MTR-A", 1, Some(-0.9)),
            scored("MTR-A", 2, Some(-0.9)),
            scored("MTR-B", 3, Some(-0.9)),
        ];
        apply_threshold(&mut rows, -0.5);
        let streaks = max_streaks(&rows);
        assert_eq!(streaks.get("MTR-A"), Some(&2));
        assert_eq!(streaks.get("MTR-B"), Some(&1));
    }

    #[test]
    fn test_meter_with_no_rows_absent_from_output() {
        let streaks = max_streaks(&[]);
        assert!(streaks.is_empty());
    }
}
