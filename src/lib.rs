/// gridwatch_service: electricity meter anomaly scoring and inspection service.
///
/// # Module structure
///
/// ```text
/// gridwatch_service
/// ├── model     — shared data types (MeterReading, InspectionRecord, PipelineError, …)
/// ├── artifacts — trained-artifact registry loader (models.toml)
/// ├── detector  — serving-path detector: global scaler+model, batch prediction
/// ├── endpoint  — REST API for scoring and inspection reporting
/// ├── export    — run output writer (scored rows, report, write-once metadata)
/// ├── ingest
/// │   ├── readings — delimited-text parsing of daily meter and weather files
/// │   └── fixtures (test only) — representative input payloads
/// └── pipeline
///     ├── features — meter+weather merge, rolling stats, standardized residuals
///     ├── scoring  — per-meter model application
///     ├── flags    — global threshold flagging and streak detection
///     └── report   — per-meter risk aggregation into inspection records
/// ```

/// Public modules
pub mod artifacts;
pub mod detector;
pub mod endpoint;
pub mod export;
pub mod ingest;
pub mod model;
pub mod pipeline;
