/// Trained-artifact registry loader - parses models.toml
///
/// The registry carries everything the scoring pipeline consumes from the
/// training side: the ordered feature list, the rolling window the models
/// were fit with, the global anomaly threshold, one scaler+model pair per
/// meter, and the named global models used by the single-model serving
/// path. Loaded once at process start and read-only thereafter; per-meter
/// lookup misses are a normal control-flow outcome, not an error.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::model::ArtifactError;

/// Default registry location, relative to the working directory
/// (project root when running via `cargo run`).
pub const DEFAULT_REGISTRY_PATH: &str = "models.toml";

// ---------------------------------------------------------------------------
// Artifact types
// ---------------------------------------------------------------------------

/// Training metadata shared by every model in the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingMetadata {
    /// Ordered feature list used at fit time. Column matching at scoring
    /// time is exact — case- and spelling-sensitive, no fuzzy matching.
    pub feature_names: Vec<String>,
    /// Rolling window (days) the residual features were fit with.
    pub rolling_window_days: usize,
    /// Global flagging threshold: score <= threshold ⇒ flagged.
    pub anomaly_threshold: f64,
    /// When the artifacts were exported, informational only.
    pub trained_at: String,
}

/// Per-feature standardization parameters from the fitted scaler.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerParams {
    /// Standardizes a feature vector. Caller guarantees the length matches;
    /// the registry validates it at load time.
    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// A fitted per-meter anomaly model: a linear decision function over the
/// scaled feature vector. Lower output = more anomalous, matching the
/// unsupervised-outlier convention.
#[derive(Debug, Clone, Deserialize)]
pub struct MeterModel {
    pub weights: Vec<f64>,
    pub offset: f64,
}

impl MeterModel {
    pub fn decision(&self, x_scaled: &[f64]) -> f64 {
        self.offset
            + self
                .weights
                .iter()
                .zip(x_scaled.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }
}

/// One meter's scaler+model pair.
#[derive(Debug, Clone)]
pub struct MeterArtifact {
    pub scaler: ScalerParams,
    pub model: MeterModel,
}

/// A named global classification model for the single-model serving path.
/// Produces a fraud probability via the logistic function over the scaled
/// feature vector.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalModel {
    pub name: String,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub scaler: ScalerParams,
    /// Per-feature importance scores, aligned with the metadata feature
    /// list. Optional — not every model family reports them.
    #[serde(default)]
    pub feature_importance: Vec<f64>,
}

impl GlobalModel {
    /// Fraud probability in (0, 1) for one scaled feature vector.
    pub fn predict_proba(&self, x_scaled: &[f64]) -> f64 {
        let z: f64 = self.bias
            + self
                .weights
                .iter()
                .zip(x_scaled.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

// ---------------------------------------------------------------------------
// TOML file structure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MeterModelConfig {
    meter_id: String,
    scaler_mean: Vec<f64>,
    scaler_scale: Vec<f64>,
    weights: Vec<f64>,
    offset: f64,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    metadata: TrainingMetadata,
    #[serde(default)]
    global_model: Vec<GlobalModel>,
    #[serde(default)]
    meter_model: Vec<MeterModelConfig>,
}

// ---------------------------------------------------------------------------
// Artifact store
// ---------------------------------------------------------------------------

/// Immutable lookup table of trained artifacts, constructed once at startup.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    metadata: TrainingMetadata,
    meters: HashMap<String, MeterArtifact>,
    globals: HashMap<String, GlobalModel>,
}

impl ArtifactStore {
    /// Loads and validates the registry from a TOML file.
    ///
    /// Any failure here is fatal at startup: the service must refuse to
    /// start rather than serve with partial or inconsistent artifacts.
    pub fn load(path: &str) -> Result<Self, ArtifactError> {
        if !Path::new(path).exists() {
            return Err(ArtifactError::MissingFile(path.to_string()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ArtifactError::Unreadable(path.to_string(), e))?;

        let file: RegistryFile = toml::from_str(&contents)
            .map_err(|e| ArtifactError::Malformed(path.to_string(), e.to_string()))?;

        Self::from_registry(file)
    }

    /// Builds the store from registry TOML already in memory. Used by tests
    /// and by callers that receive the registry from somewhere other than
    /// the local filesystem.
    pub fn from_toml_str(contents: &str) -> Result<Self, ArtifactError> {
        let file: RegistryFile = toml::from_str(contents)
            .map_err(|e| ArtifactError::Malformed("<inline>".to_string(), e.to_string()))?;
        Self::from_registry(file)
    }

    /// Builds the store from parsed registry contents, validating internal
    /// consistency (vector lengths, scaler scales, threshold finiteness).
    fn from_registry(file: RegistryFile) -> Result<Self, ArtifactError> {
        let n = file.metadata.feature_names.len();
        if n == 0 {
            return Err(ArtifactError::Inconsistent(
                "metadata.feature_names is empty".to_string(),
            ));
        }
        if !file.metadata.anomaly_threshold.is_finite() {
            return Err(ArtifactError::Inconsistent(
                "metadata.anomaly_threshold is not finite".to_string(),
            ));
        }
        if file.metadata.rolling_window_days == 0 {
            return Err(ArtifactError::Inconsistent(
                "metadata.rolling_window_days must be at least 1".to_string(),
            ));
        }

        let mut meters = HashMap::new();
        for m in file.meter_model {
            validate_vector_lengths(&m.meter_id, n, &[&m.scaler_mean, &m.scaler_scale, &m.weights])?;
            validate_scales(&m.meter_id, &m.scaler_scale)?;

            let artifact = MeterArtifact {
                scaler: ScalerParams {
                    mean: m.scaler_mean,
                    scale: m.scaler_scale,
                },
                model: MeterModel {
                    weights: m.weights,
                    offset: m.offset,
                },
            };
            if meters.insert(m.meter_id.clone(), artifact).is_some() {
                return Err(ArtifactError::Inconsistent(format!(
                    "duplicate meter_model entry for meter {}",
                    m.meter_id
                )));
            }
        }

        let mut globals = HashMap::new();
        for g in file.global_model {
            validate_vector_lengths(&g.name, n, &[&g.scaler.mean, &g.scaler.scale, &g.weights])?;
            validate_scales(&g.name, &g.scaler.scale)?;
            if !g.feature_importance.is_empty() && g.feature_importance.len() != n {
                return Err(ArtifactError::Inconsistent(format!(
                    "model {}: feature_importance length {} != feature count {}",
                    g.name,
                    g.feature_importance.len(),
                    n
                )));
            }
            if globals.insert(g.name.clone(), g).is_some() {
                return Err(ArtifactError::Inconsistent(
                    "duplicate global_model name".to_string(),
                ));
            }
        }

        Ok(Self {
            metadata: file.metadata,
            meters,
            globals,
        })
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    pub fn feature_names(&self) -> &[String] {
        &self.metadata.feature_names
    }

    pub fn feature_count(&self) -> usize {
        self.metadata.feature_names.len()
    }

    pub fn anomaly_threshold(&self) -> f64 {
        self.metadata.anomaly_threshold
    }

    pub fn rolling_window_days(&self) -> usize {
        self.metadata.rolling_window_days
    }

    /// Exact-match per-meter lookup. `None` is the coverage-gap state: the
    /// meter's rows stay unscored and are excluded from flagging.
    pub fn lookup(&self, meter_id: &str) -> Option<&MeterArtifact> {
        self.meters.get(meter_id)
    }

    pub fn meter_count(&self) -> usize {
        self.meters.len()
    }

    pub fn global_model(&self, name: &str) -> Option<&GlobalModel> {
        self.globals.get(name)
    }

    pub fn global_model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Top-N (feature, importance) pairs from the named global model,
    /// sorted descending. Empty when the model reports no importances.
    pub fn top_features(&self, model_name: &str, n: usize) -> Vec<(String, f64)> {
        let Some(model) = self.globals.get(model_name) else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, f64)> = self
            .metadata
            .feature_names
            .iter()
            .cloned()
            .zip(model.feature_importance.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        pairs.truncate(n);
        pairs
    }
}

fn validate_vector_lengths(
    owner: &str,
    expected: usize,
    vectors: &[&Vec<f64>],
) -> Result<(), ArtifactError> {
    for v in vectors {
        if v.len() != expected {
            return Err(ArtifactError::Inconsistent(format!(
                "{}: vector length {} != feature count {}",
                owner,
                v.len(),
                expected
            )));
        }
    }
    Ok(())
}

fn validate_scales(owner: &str, scales: &[f64]) -> Result<(), ArtifactError> {
    if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(ArtifactError::Inconsistent(format!(
            "{}: scaler scale values must be finite and positive",
            owner
        )));
    }
    Ok(())
}
