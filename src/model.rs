/// Core data types for the meter inspection scoring service.
///
/// This module defines the shared domain model imported by all other modules,
/// plus the typed error enums used across the pipeline and serving boundary.
/// It contains no I/O and no pipeline logic — only types.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Derived column names
// ---------------------------------------------------------------------------

/// Column name for the daily mean power reading, the base consumption signal.
pub const COL_DAILY_MEAN_POWER: &str = "daily_mean_power";

/// Columns computed by the feature builder from the raw daily signal.
pub const COL_ROLLING_MEAN: &str = "rolling_mean";
pub const COL_ROLLING_STD: &str = "rolling_std";
pub const COL_RESIDUAL: &str = "residual";
pub const COL_Z_SCORE: &str = "z_score";

// ---------------------------------------------------------------------------
// Numeric guards and limits
// ---------------------------------------------------------------------------

/// Guards z-score division when a meter's recent consumption is perfectly flat.
pub const Z_EPSILON: f64 = 1e-6;

/// Guards severity min–max normalization when all meters score identically.
pub const SEVERITY_EPSILON: f64 = 1e-9;

/// Maximum records accepted in one scoring run. Requests over this bound are
/// rejected before any computation begins.
pub const MAX_BATCH_RECORDS: usize = 10_000;

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One raw daily consumption record for a single meter.
///
/// `extra` holds any additional engineered daily features supplied alongside
/// the base signal (column name → value). Uniqueness is per (meter_id, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub meter_id: String,
    pub date: NaiveDate,
    pub daily_mean_power: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

/// One daily weather record, joined to meter readings by date only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
}

/// A fully-built feature row: merged meter + weather values plus the
/// per-meter rolling statistics and standardized residual.
///
/// Produced by `pipeline::features::build_features`; immutable once scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub meter_id: String,
    pub date: NaiveDate,
    pub daily_mean_power: f64,
    /// Merged weather + extra engineered features, keyed by column name.
    pub features: BTreeMap<String, f64>,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    pub residual: f64,
    pub z_score: f64,
}

impl FeatureRow {
    /// Resolves a feature column by name, checking the derived columns first
    /// and falling back to the merged feature map. Returns `None` for a
    /// column this row does not carry.
    pub fn feature_value(&self, name: &str) -> Option<f64> {
        match name {
            COL_DAILY_MEAN_POWER => Some(self.daily_mean_power),
            COL_ROLLING_MEAN => Some(self.rolling_mean),
            COL_ROLLING_STD => Some(self.rolling_std),
            COL_RESIDUAL => Some(self.residual),
            COL_Z_SCORE => Some(self.z_score),
            other => self.features.get(other).copied(),
        }
    }
}

/// A feature row after model application.
///
/// `anomaly_score` is `None` when no trained model exists for the meter
/// (a coverage gap — a valid skip state, not an error). Lower scores are
/// more anomalous.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub row: FeatureRow,
    pub anomaly_score: Option<f64>,
    pub anomaly_flag: bool,
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Categorical inspection risk, binned from the composite risk score:
/// [0, 33] → Low, (33, 66] → Medium, (66, 100] → High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    /// Bins a composite risk score in [0, 100].
    pub fn from_risk_score(score: f64) -> Self {
        if score > 66.0 {
            RiskLevel::High
        } else if score > 33.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// One inspection record per meter, recomputed fresh on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionRecord {
    pub meter_id: String,
    pub total_anomalies: u32,
    /// Flagged rows over total rows for this meter, as a ratio in [0, 1].
    pub percent_anomalous: f64,
    /// Minimum anomaly score (most negative = most anomalous).
    pub worst_score: f64,
    /// Mean anomaly score over rows that carry one.
    pub avg_score: f64,
    pub last_anomaly_date: Option<NaiveDate>,
    pub max_streak_days: u32,
    /// Composite score in [0, 100], rounded to one decimal.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub alert_message: String,
}

/// Write-once metadata describing one scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub anomaly_threshold: f64,
    pub rolling_window_days: usize,
    pub feature_names: Vec<String>,
    pub row_count: usize,
    pub meter_count: usize,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure class, used by the serving boundary to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any model was invoked (bad request shape/content).
    Validation,
    /// Input reached a model but its shape disagreed with the trained
    /// artifacts.
    Computation,
}

/// Per-request, recoverable failures raised by the core pipeline.
///
/// A missing per-meter model is deliberately NOT represented here — that is
/// a coverage gap, carried as `Option<f64>` on the scored row.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Request carried no records at all.
    EmptyBatch,
    /// Request exceeded the per-run record bound.
    BatchTooLarge { got: usize, max: usize },
    /// One or more declared required feature columns are absent from the
    /// input. Lists exactly the missing column names.
    MissingFeatures(Vec<String>),
    /// Feature vector length disagrees with the trained model's expected
    /// feature count.
    ShapeMismatch {
        meter_id: String,
        expected: usize,
        got: usize,
    },
    /// The requested global model name is not in the registry.
    UnknownModel(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmptyBatch
            | PipelineError::BatchTooLarge { .. }
            | PipelineError::MissingFeatures(_)
            | PipelineError::UnknownModel(_) => ErrorKind::Validation,
            PipelineError::ShapeMismatch { .. } => ErrorKind::Computation,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::EmptyBatch => write!(f, "Empty request: no records provided"),
            PipelineError::BatchTooLarge { got, max } => {
                write!(f, "Batch size {} exceeds maximum ({})", got, max)
            }
            PipelineError::MissingFeatures(names) => {
                write!(f, "Missing required features: {}", names.join(", "))
            }
            PipelineError::ShapeMismatch {
                meter_id,
                expected,
                got,
            } => write!(
                f,
                "Feature count mismatch for meter {}: expected {}, got {}",
                meter_id, expected, got
            ),
            PipelineError::UnknownModel(name) => {
                write!(f, "Unknown model: {}", name)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Fatal startup failures: trained artifacts missing, unreadable, or
/// internally inconsistent. The service refuses to start on any of these.
#[derive(Debug)]
pub enum ArtifactError {
    /// Registry file not found at the configured path.
    MissingFile(String),
    /// Registry file exists but could not be read.
    Unreadable(String, std::io::Error),
    /// Registry file is not valid TOML or fails deserialization.
    Malformed(String, String),
    /// Registry parsed but its contents disagree with themselves
    /// (vector length mismatches, non-positive scaler scales, …).
    Inconsistent(String),
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactError::MissingFile(path) => {
                write!(f, "Trained-artifact registry not found: {}\n\n", path)?;
                write!(f, "  Required setup:\n")?;
                write!(f, "  1. Export trained models to models.toml (see models.toml in the repo root for the format)\n")?;
                write!(f, "  2. Point GRIDWATCH_ARTIFACTS at the file, or pass --artifacts PATH")
            }
            ArtifactError::Unreadable(path, e) => {
                write!(f, "Failed to read artifact registry {}: {}", path, e)
            }
            ArtifactError::Malformed(path, msg) => {
                write!(f, "Failed to parse artifact registry {}: {}\n\n", path, msg)?;
                write!(f, "  The file must be valid TOML with [metadata], [[global_model]] and [[meter_model]] sections")
            }
            ArtifactError::Inconsistent(msg) => {
                write!(f, "Artifact registry is internally inconsistent: {}", msg)
            }
        }
    }
}

impl std::error::Error for ArtifactError {}
