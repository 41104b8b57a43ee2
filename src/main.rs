//! Grid Watch Service - Scoring Daemon
//!
//! A server-side service that:
//! 1. Loads trained anomaly-detection artifacts from a TOML registry
//! 2. Serves scoring and inspection requests over a REST endpoint
//! 3. Refuses to start serving when artifacts are missing or inconsistent
//!
//! Model training is handled offline; this service only applies exported
//! artifacts. Lower anomaly scores are more anomalous.
//!
//! Usage:
//!   cargo run --release                         # Serve on the default port
//!   cargo run --release -- --endpoint 8080      # Serve on port 8080
//!   cargo run --release -- --artifacts my.toml  # Load a specific registry
//!
//! Environment:
//!   GRIDWATCH_ARTIFACTS - Path to the trained-artifact registry
//!   GRIDWATCH_WORKERS   - Endpoint worker thread count

use std::env;
use std::sync::Arc;

use gridwatch_service::artifacts::DEFAULT_REGISTRY_PATH;
use gridwatch_service::detector::Detector;
use gridwatch_service::endpoint::{self, ServiceState};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WORKERS: usize = 4;

fn main() {
    println!("⚡ Grid Watch Service");
    println!("=====================\n");

    dotenv::dotenv().ok();

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut endpoint_port: u16 = DEFAULT_PORT;
    let mut artifacts_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(port) => endpoint_port = port,
                        Err(_) => {
                            eprintln!("Error: --endpoint requires a valid port number");
                            std::process::exit(1);
                        }
                    }
                    i += 2;
                } else {
                    eprintln!("Error: --endpoint requires a port number");
                    std::process::exit(1);
                }
            }
            "--artifacts" => {
                if i + 1 < args.len() {
                    artifacts_path = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Error: --artifacts requires a file path");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--endpoint PORT] [--artifacts PATH]", args[0]);
                std::process::exit(1);
            }
        }
    }

    let registry_path = artifacts_path
        .or_else(|| env::var("GRIDWATCH_ARTIFACTS").ok())
        .unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_string());

    // Load trained artifacts; any failure here is fatal
    println!("📊 Loading trained artifacts from {}...", registry_path);
    let detector = match Detector::load(&registry_path) {
        Ok(detector) => detector,
        Err(e) => {
            eprintln!("\n❌ Artifact loading failed: {}\n", e);
            std::process::exit(1);
        }
    };

    let store = detector.store();
    println!("✓ Artifacts loaded");
    println!("   {} features per record", store.feature_count());
    println!("   {} per-meter models", store.meter_count());
    println!("   {} global models", store.global_model_names().len());
    println!(
        "   anomaly threshold {} over a {}-day rolling window\n",
        store.anomaly_threshold(),
        store.rolling_window_days()
    );

    let workers = env::var("GRIDWATCH_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WORKERS);

    println!("🚀 Starting HTTP endpoint server...");
    println!("   Worker threads: {}", workers);
    println!("   Press Ctrl+C to stop\n");

    let state = ServiceState::new(Arc::new(detector));
    if let Err(e) = endpoint::start_endpoint_server(endpoint_port, state, workers) {
        eprintln!("\n❌ Endpoint server error: {}", e);
        std::process::exit(1);
    }
}
