/// Feature builder: merge raw meter readings with weather, then compute
/// per-meter rolling statistics and standardized residuals.
///
/// Pure transform — given the same inputs, window, and date range it always
/// produces the same rows, sorted by (meter_id, date) with no missing
/// values. Rows that cannot be completed (no weather for the date, or a
/// non-finite value anywhere) are dropped rather than interpolated.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{FeatureRow, MeterReading, WeatherReading, Z_EPSILON};

/// Builds one feature row per (meter_id, date) inside [start, end].
///
/// Join is a left join of meter readings to weather on date; a reading whose
/// date has no weather record is dropped. Duplicate (meter_id, date) pairs
/// keep the first occurrence so the uniqueness invariant holds.
///
/// Rolling mean and std of daily_mean_power use a trailing window of
/// `window` days per meter, expanding (minimum period 1) during warm-up so
/// the first `window - 1` rows still get values.
pub fn build_features(
    readings: &[MeterReading],
    weather: &[WeatherReading],
    start: NaiveDate,
    end: NaiveDate,
    window: usize,
) -> Vec<FeatureRow> {
    let weather_by_date: BTreeMap<NaiveDate, &BTreeMap<String, f64>> =
        weather.iter().map(|w| (w.date, &w.features)).collect();

    // Filter, join, and merge. Sort before grouping so rolling statistics
    // see each meter's readings in date order.
    let mut merged: Vec<(String, NaiveDate, f64, BTreeMap<String, f64>)> = Vec::new();
    for reading in readings {
        if reading.date < start || reading.date > end {
            continue;
        }
        if !reading.daily_mean_power.is_finite() {
            continue;
        }
        let Some(weather_features) = weather_by_date.get(&reading.date) else {
            continue; // No weather for this date: required fields empty.
        };

        let mut features = reading.extra.clone();
        for (name, value) in weather_features.iter() {
            features.insert(name.clone(), *value);
        }
        if features.values().any(|v| !v.is_finite()) {
            continue;
        }

        merged.push((
            reading.meter_id.clone(),
            reading.date,
            reading.daily_mean_power,
            features,
        ));
    }

    merged.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    merged.dedup_by(|later, earlier| later.0 == earlier.0 && later.1 == earlier.1);

    // Per-meter rolling statistics over the sorted rows.
    let mut rows = Vec::with_capacity(merged.len());
    let mut meter_start = 0usize;
    while meter_start < merged.len() {
        let meter_id = &merged[meter_start].0;
        let meter_end = merged[meter_start..]
            .iter()
            .position(|r| &r.0 != meter_id)
            .map(|offset| meter_start + offset)
            .unwrap_or(merged.len());

        let group = &merged[meter_start..meter_end];
        let powers: Vec<f64> = group.iter().map(|r| r.2).collect();

        for (i, (meter_id, date, power, features)) in group.iter().enumerate() {
            let window_start = (i + 1).saturating_sub(window);
            let slice = &powers[window_start..=i];
            let rolling_mean = mean(slice);
            let rolling_std = sample_std(slice, rolling_mean);
            let residual = power - rolling_mean;
            let z_score = residual / (rolling_std + Z_EPSILON);

            rows.push(FeatureRow {
                meter_id: meter_id.clone(),
                date: *date,
                daily_mean_power: *power,
                features: features.clone(),
                rolling_mean,
                rolling_std,
                residual,
                z_score,
            });
        }

        meter_start = meter_end;
    }

    rows
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). A single-observation
/// window yields 0.0 so the warm-up period produces no missing values.
fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn reading(meter: &str, day: u32, power: f64) -> MeterReading {
        MeterReading {
            meter_id: meter.to_string(),
            date: d(day),
            daily_mean_power: power,
            extra: BTreeMap::new(),
        }
    }

    fn weather_for_days(days: &[u32]) -> Vec<WeatherReading> {
        days.iter()
            .map(|&day| {
                let mut features = BTreeMap::new();
                features.insert("temp_mean_c".to_string(), 20.0 + day as f64);
                WeatherReading {
                    date: d(day),
                    features,
                }
            })
            .collect()
    }

    #[test]
    fn test_output_sorted_by_meter_then_date() {
        let readings = vec![
            reading("MTR-002", 2, 5.0),
            reading("MTR-001", 3, 7.0),
            reading("MTR-001", 1, 6.0),
        ];
        let weather = weather_for_days(&[1, 2, 3]);
        let rows = build_features(&readings, &weather, d(1), d(31), 7);

        let keys: Vec<(String, NaiveDate)> = rows
            .iter()
            .map(|r| (r.meter_id.clone(), r.date))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("MTR-001".to_string(), d(1)),
                ("MTR-001".to_string(), d(3)),
                ("MTR-002".to_string(), d(2)),
            ]
        );
    }

    #[test]
    fn test_rows_without_weather_are_dropped() {
        let readings = vec![reading("MTR-001", 1, 6.0), reading("MTR-001", 2, 7.0)];
        let weather = weather_for_days(&[1]); // No weather for day 2.
        let rows = build_features(&readings, &weather, d(1), d(31), 7);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, d(1));
    }

    #[test]
    fn test_date_window_filter_applies_before_rolling() {
        let readings = vec![
            reading("MTR-001", 1, 100.0), // Outside window, must not leak in.
            reading("MTR-001", 10, 6.0),
            reading("MTR-001", 11, 8.0),
        ];
        let weather = weather_for_days(&[1, 10, 11]);
        let rows = build_features(&readings, &weather, d(10), d(20), 7);

        assert_eq!(rows.len(), 2);
        // First in-window row's expanding window contains only itself.
        assert_eq!(rows[0].rolling_mean, 6.0);
        assert_eq!(rows[0].rolling_std, 0.0);
    }

    #[test]
    fn test_expanding_warmup_then_fixed_window() {
        let readings: Vec<MeterReading> = (1..=5)
            .map(|day| reading("MTR-001", day, day as f64))
            .collect();
        let weather = weather_for_days(&[1, 2, 3, 4, 5]);
        let rows = build_features(&readings, &weather, d(1), d(31), 3);

        // Warm-up: expanding means 1, 1.5, 2; then trailing-3 means 3, 4.
        let means: Vec<f64> = rows.iter().map(|r| r.rolling_mean).collect();
        assert_eq!(means, vec![1.0, 1.5, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_flat_consumption_gives_zero_z_score() {
        let readings: Vec<MeterReading> =
            (1..=4).map(|day| reading("MTR-001", day, 5.0)).collect();
        let weather = weather_for_days(&[1, 2, 3, 4]);
        let rows = build_features(&readings, &weather, d(1), d(31), 7);

        for row in &rows {
            assert_eq!(row.residual, 0.0);
            assert_eq!(row.z_score, 0.0, "flat series must not divide by zero");
        }
    }

    #[test]
    fn test_weather_features_merged_into_row() {
        let readings = vec![reading("MTR-001", 2, 6.0)];
        let weather = weather_for_days(&[2]);
        let rows = build_features(&readings, &weather, d(1), d(31), 7);

        assert_eq!(rows[0].feature_value("temp_mean_c"), Some(22.0));
    }

    #[test]
    fn test_duplicate_meter_date_keeps_first() {
        let readings = vec![reading("MTR-001", 2, 6.0), reading("MTR-001", 2, 99.0)];
        let weather = weather_for_days(&[2]);
        let rows = build_features(&readings, &weather, d(1), d(31), 7);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].daily_mean_power, 6.0);
    }

    #[test]
    fn test_non_finite_values_dropped() {
        let mut bad = reading("MTR-001", 2, f64::NAN);
        bad.extra.insert("spike_count".to_string(), 1.0);
        let readings = vec![bad, reading("MTR-001", 3, 6.0)];
        let weather = weather_for_days(&[2, 3]);
        let rows = build_features(&readings, &weather, d(1), d(31), 7);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, d(3));
    }
}
