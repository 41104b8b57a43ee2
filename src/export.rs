/// Run output writer.
///
/// Persists one inspection run as three files in an output directory:
/// - `scored_rows.jsonl`       - one flat JSON object per scored row
/// - `inspection_report.json`  - the per-meter inspection records
/// - `run_metadata.json`       - run parameters, written last and write-once
///
/// The metadata file doubles as the run's completion marker: it is created
/// with create-new semantics, so re-running into the same directory fails
/// instead of silently overwriting a finished run.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::ScoredRow;
use crate::pipeline::InspectionRun;

pub const SCORED_ROWS_FILE: &str = "scored_rows.jsonl";
pub const REPORT_FILE: &str = "inspection_report.json";
pub const METADATA_FILE: &str = "run_metadata.json";

/// One scored row flattened for line-oriented export: derived columns at the
/// top level, merged weather/extra features spread alongside them.
#[derive(Debug, Clone, Serialize)]
pub struct FlatScoredRecord {
    pub meter_id: String,
    pub date: NaiveDate,
    pub daily_mean_power: f64,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    pub residual: f64,
    pub z_score: f64,
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
    pub anomaly_score: Option<f64>,
    pub anomaly_flag: bool,
}

/// Paths of the files one run produced.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub scored_rows: PathBuf,
    pub report: PathBuf,
    pub metadata: PathBuf,
}

pub fn flatten_scored(rows: &[ScoredRow]) -> Vec<FlatScoredRecord> {
    rows.iter()
        .map(|scored| FlatScoredRecord {
            meter_id: scored.row.meter_id.clone(),
            date: scored.row.date,
            daily_mean_power: scored.row.daily_mean_power,
            rolling_mean: scored.row.rolling_mean,
            rolling_std: scored.row.rolling_std,
            residual: scored.row.residual,
            z_score: scored.row.z_score,
            features: scored.row.features.clone(),
            anomaly_score: scored.anomaly_score,
            anomaly_flag: scored.anomaly_flag,
        })
        .collect()
}

/// Writes a complete run into `dir`, creating it if needed.
///
/// Fails with `AlreadyExists` when the directory already holds a finished
/// run (its metadata file is present).
pub fn write_run(dir: &Path, run: &InspectionRun) -> Result<RunPaths, std::io::Error> {
    fs::create_dir_all(dir)?;

    let paths = RunPaths {
        scored_rows: dir.join(SCORED_ROWS_FILE),
        report: dir.join(REPORT_FILE),
        metadata: dir.join(METADATA_FILE),
    };

    if paths.metadata.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Run already finalized: {} exists", paths.metadata.display()),
        ));
    }

    let mut rows_file = File::create(&paths.scored_rows)?;
    for record in flatten_scored(&run.scored_rows) {
        let line = serde_json::to_string(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(rows_file, "{}", line)?;
    }

    let report = serde_json::to_string_pretty(&run.records)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&paths.report, report)?;

    // Written last: a metadata file means every other file is complete.
    let metadata = serde_json::to_string_pretty(&run.metadata)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut metadata_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&paths.metadata)?;
    metadata_file.write_all(metadata.as_bytes())?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::ingest::fixtures::{fixture_meter_csv, fixture_registry_toml, fixture_weather_csv};
    use crate::ingest::readings::{parse_meter_csv, parse_weather_csv};
    use crate::pipeline::run_inspection;
    use chrono::NaiveDate;

    fn fixture_run() -> InspectionRun {
        let store =
            ArtifactStore::from_toml_str(fixture_registry_toml()).expect("fixture registry loads");
        let readings = parse_meter_csv(fixture_meter_csv()).unwrap();
        let weather = parse_weather_csv(fixture_weather_csv()).unwrap();
        run_inspection(
            &readings,
            &weather,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            &store,
        )
        .unwrap()
    }

    fn test_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gridwatch_export_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_flatten_spreads_features_to_top_level() {
        let run = fixture_run();
        let flat = flatten_scored(&run.scored_rows);
        assert_eq!(flat.len(), run.scored_rows.len());

        let value = serde_json::to_value(&flat[0]).unwrap();
        assert!(value.get("meter_id").is_some());
        assert!(value.get("z_score").is_some());
        assert!(
            value.get("temp_mean_c").is_some(),
            "merged weather columns should flatten to the top level"
        );
        assert!(value.get("features").is_none());
    }

    #[test]
    fn test_write_run_produces_all_three_files() {
        let dir = test_dir("full");
        let _ = fs::remove_dir_all(&dir);

        let run = fixture_run();
        let paths = write_run(&dir, &run).unwrap();

        assert!(paths.scored_rows.exists());
        assert!(paths.report.exists());
        assert!(paths.metadata.exists());

        let lines = fs::read_to_string(&paths.scored_rows).unwrap();
        assert_eq!(lines.lines().count(), run.scored_rows.len());
        for line in lines.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("anomaly_flag").is_some());
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_run_refuses_to_overwrite_finished_run() {
        let dir = test_dir("once");
        let _ = fs::remove_dir_all(&dir);

        let run = fixture_run();
        write_run(&dir, &run).unwrap();
        let second = write_run(&dir, &run);
        assert_eq!(
            second.err().map(|e| e.kind()),
            Some(std::io::ErrorKind::AlreadyExists)
        );

        let _ = fs::remove_dir_all(&dir);
    }
}
