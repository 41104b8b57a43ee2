#!/usr/bin/env rust
//! Batch Inspection Run
//!
//! Runs the full anomaly scoring pipeline over exported daily files and
//! writes an inspection report for review.
//!
//! For one batch of readings:
//! 1. Parse the meter and weather files
//! 2. Build feature rows (merge, rolling stats, standardized residuals)
//! 3. Apply per-meter models and the global anomaly threshold
//! 4. Aggregate per-meter risk into inspection records
//! 5. Write scored rows, the report, and write-once run metadata
//!
//! Usage:
//!   cargo run --bin run_inspection -- --meters daily.csv --weather weather.csv \
//!       --start 2026-03-01 --end 2026-03-31 --out runs/2026-03
//!
//! Environment:
//!   GRIDWATCH_ARTIFACTS - Path to the trained-artifact registry

use std::env;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use gridwatch_service::artifacts::{ArtifactStore, DEFAULT_REGISTRY_PATH};
use gridwatch_service::export;
use gridwatch_service::ingest::readings::{parse_meter_csv, parse_weather_csv};
use gridwatch_service::model::RiskLevel;
use gridwatch_service::pipeline::run_inspection;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("⚡ Batch Inspection Run");
    println!("=======================\n");

    dotenv::dotenv().ok();

    // Parse arguments
    let args: Vec<String> = env::args().collect();
    let meters_path = required_arg(&args, "--meters")?;
    let weather_path = required_arg(&args, "--weather")?;
    let start = parse_date(&required_arg(&args, "--start")?, "--start")?;
    let end = parse_date(&required_arg(&args, "--end")?, "--end")?;
    let out_dir = PathBuf::from(required_arg(&args, "--out")?);

    let registry_path = optional_arg(&args, "--artifacts")
        .or_else(|| env::var("GRIDWATCH_ARTIFACTS").ok())
        .unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_string());

    // Load trained artifacts
    println!("📊 Loading trained artifacts from {}...", registry_path);
    let store = ArtifactStore::load(&registry_path).unwrap_or_else(|e| {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    });
    println!(
        "✓ {} per-meter models, {} features, threshold {}\n",
        store.meter_count(),
        store.feature_count(),
        store.anomaly_threshold()
    );

    // Parse input files
    println!("📋 Reading input files...");
    let meter_text = fs::read_to_string(&meters_path)?;
    let weather_text = fs::read_to_string(&weather_path)?;
    let readings = parse_meter_csv(&meter_text)?;
    let weather = parse_weather_csv(&weather_text)?;
    println!(
        "✓ {} meter rows, {} weather days\n",
        readings.len(),
        weather.len()
    );

    // Run the pipeline
    println!("🔍 Scoring {} through {}...", start, end);
    let run = run_inspection(&readings, &weather, start, end, &store)?;
    println!(
        "✓ {} rows scored across {} meters\n",
        run.metadata.row_count, run.metadata.meter_count
    );

    // Summarize per-meter outcomes
    let mut high = 0;
    let mut medium = 0;
    for record in &run.records {
        match record.risk_level {
            RiskLevel::High => high += 1,
            RiskLevel::Medium => medium += 1,
            RiskLevel::Low => {}
        }
        if record.risk_level != RiskLevel::Low {
            println!(
                "  {} risk {:5.1}  {} ({} anomalous days, max streak {})",
                record.risk_level.as_str(),
                record.risk_score,
                record.meter_id,
                record.total_anomalies,
                record.max_streak_days
            );
        }
    }
    println!(
        "\n📈 {} meters reported: {} high risk, {} medium risk",
        run.records.len(),
        high,
        medium
    );

    // Persist the run
    let paths = export::write_run(&out_dir, &run)?;
    println!("\n💾 Run written:");
    println!("   {}", paths.scored_rows.display());
    println!("   {}", paths.report.display());
    println!("   {}", paths.metadata.display());

    Ok(())
}

fn required_arg(args: &[String], name: &str) -> Result<String, String> {
    optional_arg(args, name).ok_or_else(|| {
        format!(
            "Missing {} argument\nUsage: run_inspection --meters FILE --weather FILE \
             --start YYYY-MM-DD --end YYYY-MM-DD --out DIR [--artifacts PATH]",
            name
        )
    })
}

fn optional_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_date(raw: &str, name: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("{} must be a YYYY-MM-DD date, got '{}'", name, raw))
}
