/// Representative input payloads for tests.
///
/// Kept small but structurally faithful: the CSV fixtures carry the exact
/// headers the parsers require, and the registry fixture exercises every
/// section of models.toml (metadata, per-meter models, global models).

/// Daily meter readings export: two meters over four days, with one extra
/// engineered column (`spike_count`). MTR-001 day 4 jumps well above its
/// trailing history.
pub fn fixture_meter_csv() -> &'static str {
    "\
# daily consumption export, kWh means
meter_id,date,daily_mean_power,spike_count
MTR-001,2026-03-01,10.2,0
MTR-001,2026-03-02,10.4,0
MTR-001,2026-03-03,10.1,0
MTR-001,2026-03-04,46.0,3
MTR-002,2026-03-01,7.5,0
MTR-002,2026-03-02,7.4,0
MTR-002,2026-03-03,7.6,0
MTR-002,2026-03-04,7.5,0
"
}

/// Matching daily weather export for the same four days.
pub fn fixture_weather_csv() -> &'static str {
    "\
date,temp_mean_c,temp_min_c
2026-03-01,18.0,11.0
2026-03-02,18.5,11.5
2026-03-03,17.5,10.0
2026-03-04,18.0,11.0
"
}

/// A complete trained-artifact registry: ordered feature list, window and
/// threshold, per-meter scaler+model pairs for MTR-001/MTR-002, and two
/// named global models for the serving path.
///
/// The per-meter decision functions weight `z_score` negatively so a larger
/// standardized deviation drives the anomaly score down.
pub fn fixture_registry_toml() -> &'static str {
    r#"
[metadata]
feature_names = [
    "daily_mean_power",
    "rolling_mean",
    "rolling_std",
    "residual",
    "z_score",
    "temp_mean_c",
    "temp_min_c",
]
rolling_window_days = 7
anomaly_threshold = -0.5
trained_at = "2026-02-21T09:00:00Z"

[[meter_model]]
meter_id = "MTR-001"
scaler_mean = [10.0, 10.0, 0.5, 0.0, 0.0, 18.0, 11.0]
scaler_scale = [4.0, 4.0, 1.0, 2.0, 1.0, 6.0, 6.0]
weights = [0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0]
offset = 0.5

[[meter_model]]
meter_id = "MTR-002"
scaler_mean = [7.5, 7.5, 0.3, 0.0, 0.0, 18.0, 11.0]
scaler_scale = [3.0, 3.0, 1.0, 1.5, 2.0, 6.0, 6.0]
weights = [0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0]
offset = 0.4

[[global_model]]
name = "logistic_regression"
weights = [0.10, -0.05, 0.30, 0.15, 1.20, -0.05, 0.02]
bias = -1.0
feature_importance = [0.05, 0.03, 0.16, 0.08, 0.63, 0.03, 0.02]

[global_model.scaler]
mean = [9.0, 9.0, 0.4, 0.0, 0.0, 18.0, 11.0]
scale = [4.0, 4.0, 1.0, 2.0, 1.0, 6.0, 6.0]

[[global_model]]
name = "linear_svm"
weights = [0.08, -0.02, 0.25, 0.10, 1.05, -0.04, 0.01]
bias = -0.8

[global_model.scaler]
mean = [9.0, 9.0, 0.4, 0.0, 0.0, 18.0, 11.0]
scale = [4.0, 4.0, 1.0, 2.0, 1.0, 6.0, 6.0]
"#
}
