/// HTTP endpoint for anomaly scoring and inspection reporting
///
/// Provides a simple REST API for external tools (billing systems, field
/// dispatch) to score meter records and request inspection reports.
///
/// Endpoints:
/// - GET  /health        - Service health check (always answers)
/// - GET  /model_info    - Loaded artifact metadata
/// - GET  /features      - Required feature columns, in model order
/// - POST /predict       - Score a single feature record
/// - POST /predict_batch - Score up to 10,000 records with a summary
/// - POST /inspect       - Run the full inspection pipeline over raw readings
///
/// Every handler that touches the model goes through the detector
/// precondition first: if no detector is attached the reply is 503, never a
/// panic. Validation failures map to 400, computation failures to 422; full
/// detail is logged server-side and only a safe summary is returned.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use threadpool::ThreadPool;

use crate::detector::{Detector, PredictRecord, DEFAULT_MODEL, DEFAULT_PREDICT_THRESHOLD};
use crate::model::{ErrorKind, MeterReading, PipelineError, RiskLevel, WeatherReading};
use crate::pipeline;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

type HttpResponse = tiny_http::Response<std::io::Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Service State
// ---------------------------------------------------------------------------

/// Shared, read-only state handed to every request handler.
///
/// `detector` is optional so the health endpoint can keep answering (and
/// report not-ready) even when artifact loading failed upstream.
pub struct ServiceState {
    pub detector: Option<Arc<Detector>>,
}

impl ServiceState {
    pub fn new(detector: Arc<Detector>) -> Self {
        Self {
            detector: Some(detector),
        }
    }

    pub fn without_detector() -> Self {
        Self { detector: None }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start the HTTP endpoint server on the specified port, dispatching
/// requests across a fixed worker pool. Blocks until the listener dies.
pub fn start_endpoint_server(
    port: u16,
    state: ServiceState,
    workers: usize,
) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;
    let server = Arc::new(server);
    let state = Arc::new(state);

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    println!("   GET  /health        - Service health check");
    println!("   GET  /model_info    - Loaded artifact metadata");
    println!("   GET  /features      - Required feature columns");
    println!("   POST /predict       - Score one feature record");
    println!("   POST /predict_batch - Score a batch of records");
    println!("   POST /inspect       - Full inspection pipeline\n");

    let pool = ThreadPool::new(workers);
    for _ in 0..workers {
        let server = Arc::clone(&server);
        let state = Arc::clone(&state);
        pool.execute(move || loop {
            match server.recv() {
                Ok(request) => handle_request(request, &state),
                Err(e) => {
                    eprintln!("Endpoint listener error: {}", e);
                    break;
                }
            }
        });
    }

    pool.join();
    Ok(())
}

fn handle_request(mut request: tiny_http::Request, state: &ServiceState) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let mut body = String::new();
    if let Some(len) = request.body_length() {
        if len > MAX_BODY_BYTES {
            let response = create_response(
                413,
                json!({ "error": format!("Request body exceeds {} bytes", MAX_BODY_BYTES) }),
            );
            respond(request, response);
            return;
        }
    }
    if let Err(e) = request.as_reader().read_to_string(&mut body) {
        eprintln!("Failed to read request body for {:?} {}: {}", method, url, e);
        let response = create_response(400, json!({ "error": "Unreadable request body" }));
        respond(request, response);
        return;
    }

    let response = match (&method, url.as_str()) {
        (tiny_http::Method::Get, "/health") => handle_health(state),
        (tiny_http::Method::Get, "/model_info") => handle_model_info(state),
        (tiny_http::Method::Get, "/features") => handle_features(state),
        (tiny_http::Method::Post, "/predict") => handle_predict(state, &body),
        (tiny_http::Method::Post, "/predict_batch") => handle_predict_batch(state, &body),
        (tiny_http::Method::Post, "/inspect") => handle_inspect(state, &body),
        _ => create_response(
            404,
            json!({
                "error": "Not found",
                "available_endpoints": [
                    "/health", "/model_info", "/features",
                    "/predict", "/predict_batch", "/inspect"
                ]
            }),
        ),
    };

    respond(request, response);
}

fn respond(request: tiny_http::Request, response: HttpResponse) {
    if let Err(e) = request.respond(response) {
        eprintln!("Failed to send response: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handle /health: answers even when no detector is attached.
fn handle_health(state: &ServiceState) -> HttpResponse {
    create_response(
        200,
        json!({
            "status": "ok",
            "service": "gridwatch_service",
            "version": env!("CARGO_PKG_VERSION"),
            "detector_ready": state.detector.as_ref().is_some_and(|d| d.is_ready()),
        }),
    )
}

fn handle_model_info(state: &ServiceState) -> HttpResponse {
    let Some(detector) = ready_detector(state) else {
        return detector_unavailable();
    };
    create_response(200, detector.model_info())
}

fn handle_features(state: &ServiceState) -> HttpResponse {
    let Some(detector) = ready_detector(state) else {
        return detector_unavailable();
    };
    let store = detector.store();
    let top: Vec<serde_json::Value> = store
        .top_features(DEFAULT_MODEL, 5)
        .into_iter()
        .map(|(name, importance)| json!({ "feature": name, "importance": importance }))
        .collect();
    create_response(
        200,
        json!({
            "features": store.feature_names(),
            "feature_count": store.feature_count(),
            "rolling_window_days": store.rolling_window_days(),
            "top_features": top,
        }),
    )
}

/// Handle /predict: one feature record under a required "features" key.
fn handle_predict(state: &ServiceState, body: &str) -> HttpResponse {
    let Some(detector) = ready_detector(state) else {
        return detector_unavailable();
    };

    let payload = match parse_json_body(body) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let Some(features) = payload.get("features") else {
        return create_response(
            400,
            json!({ "error": "Missing 'features' key in request body" }),
        );
    };
    let record = match parse_feature_object(features) {
        Ok(record) => record,
        Err(message) => return create_response(400, json!({ "error": message })),
    };
    let model_choice = model_choice(&payload);

    match detector.predict_batch(&[record], model_choice, DEFAULT_PREDICT_THRESHOLD) {
        Ok(predictions) => {
            let p = &predictions[0];
            create_response(
                200,
                json!({
                    "prediction": p.prediction,
                    "fraud_probability": p.fraud_probability,
                    "risk_level": p.risk_level.as_str(),
                    "model": model_choice,
                }),
            )
        }
        Err(e) => pipeline_error_response("predict", &e),
    }
}

/// Handle /predict_batch: a "records" array plus optional "model" and
/// "threshold" overrides. Replies with per-record results and a summary.
fn handle_predict_batch(state: &ServiceState, body: &str) -> HttpResponse {
    let Some(detector) = ready_detector(state) else {
        return detector_unavailable();
    };

    let payload = match parse_json_body(body) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let Some(records_value) = payload.get("records") else {
        return create_response(
            400,
            json!({ "error": "Missing 'records' key in request body" }),
        );
    };
    let records = match parse_record_array(records_value) {
        Ok(records) => records,
        Err(message) => return create_response(400, json!({ "error": message })),
    };
    let model_choice = model_choice(&payload);
    let threshold = payload
        .get("threshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_PREDICT_THRESHOLD);

    match detector.predict_batch(&records, model_choice, threshold) {
        Ok(predictions) => {
            let theft_detected = predictions.iter().filter(|p| p.prediction == 1).count();
            let high_risk = predictions
                .iter()
                .filter(|p| p.risk_level == RiskLevel::High)
                .count();
            let avg_probability = predictions
                .iter()
                .map(|p| p.fraud_probability)
                .sum::<f64>()
                / predictions.len() as f64;

            let results: Vec<serde_json::Value> = predictions
                .iter()
                .map(|p| {
                    json!({
                        "meter_id": p.meter_id,
                        "prediction": p.prediction,
                        "fraud_probability": p.fraud_probability,
                        "risk_level": p.risk_level.as_str(),
                    })
                })
                .collect();

            create_response(
                200,
                json!({
                    "model": model_choice,
                    "threshold": threshold,
                    "results": results,
                    "summary": {
                        "total_records": predictions.len(),
                        "theft_detected": theft_detected,
                        "normal": predictions.len() - theft_detected,
                        "high_risk_count": high_risk,
                        "avg_fraud_probability": avg_probability,
                    },
                }),
            )
        }
        Err(e) => pipeline_error_response("predict_batch", &e),
    }
}

/// Handle /inspect: raw meter and weather readings in, inspection report
/// out. Runs the complete feature/score/flag/aggregate pipeline.
fn handle_inspect(state: &ServiceState, body: &str) -> HttpResponse {
    let Some(detector) = ready_detector(state) else {
        return detector_unavailable();
    };

    let payload = match parse_json_body(body) {
        Ok(value) => value,
        Err(response) => return response,
    };

    let readings: Vec<MeterReading> = match payload.get("meter_readings") {
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(readings) => readings,
            Err(e) => {
                return create_response(
                    400,
                    json!({ "error": format!("Invalid 'meter_readings': {}", e) }),
                );
            }
        },
        None => {
            return create_response(
                400,
                json!({ "error": "Missing 'meter_readings' key in request body" }),
            );
        }
    };
    let weather: Vec<WeatherReading> = match payload.get("weather") {
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(weather) => weather,
            Err(e) => {
                return create_response(
                    400,
                    json!({ "error": format!("Invalid 'weather': {}", e) }),
                );
            }
        },
        None => {
            return create_response(
                400,
                json!({ "error": "Missing 'weather' key in request body" }),
            );
        }
    };
    let start = match parse_date_field(&payload, "start_date") {
        Ok(date) => date,
        Err(response) => return response,
    };
    let end = match parse_date_field(&payload, "end_date") {
        Ok(date) => date,
        Err(response) => return response,
    };

    match pipeline::run_inspection(&readings, &weather, start, end, detector.store()) {
        Ok(run) => create_response(
            200,
            json!({
                "scored_rows": crate::export::flatten_scored(&run.scored_rows),
                "records": run.records,
                "metadata": run.metadata,
            }),
        ),
        Err(e) => pipeline_error_response("inspect", &e),
    }
}

// ---------------------------------------------------------------------------
// Request Parsing
// ---------------------------------------------------------------------------

fn parse_json_body(body: &str) -> Result<serde_json::Value, HttpResponse> {
    if body.trim().is_empty() {
        return Err(create_response(
            400,
            json!({ "error": "Empty request body" }),
        ));
    }
    serde_json::from_str(body).map_err(|e| {
        create_response(400, json!({ "error": format!("Invalid JSON: {}", e) }))
    })
}

fn model_choice(payload: &serde_json::Value) -> &str {
    payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_MODEL)
}

/// Converts a JSON object of feature name → number into a scoring record.
/// An optional "meter_id" string field is carried through for reporting.
fn parse_feature_object(value: &serde_json::Value) -> Result<PredictRecord, String> {
    let Some(object) = value.as_object() else {
        return Err("'features' must be a JSON object".to_string());
    };

    let mut meter_id = None;
    let mut features = BTreeMap::new();
    for (name, field) in object {
        if name == "meter_id" {
            meter_id = field.as_str().map(|s| s.to_string());
            continue;
        }
        let Some(number) = field.as_f64() else {
            return Err(format!("Feature '{}' must be numeric", name));
        };
        features.insert(name.clone(), number);
    }

    Ok(PredictRecord { meter_id, features })
}

fn parse_record_array(value: &serde_json::Value) -> Result<Vec<PredictRecord>, String> {
    let Some(array) = value.as_array() else {
        return Err("'records' must be a JSON array".to_string());
    };
    array
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_feature_object(item).map_err(|e| format!("Record {}: {}", i, e))
        })
        .collect()
}

fn parse_date_field(
    payload: &serde_json::Value,
    key: &str,
) -> Result<NaiveDate, HttpResponse> {
    let Some(raw) = payload.get(key).and_then(|v| v.as_str()) else {
        return Err(create_response(
            400,
            json!({ "error": format!("Missing '{}' key in request body", key) }),
        ));
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        create_response(
            400,
            json!({ "error": format!("'{}' must be a YYYY-MM-DD date", key) }),
        )
    })
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn ready_detector(state: &ServiceState) -> Option<&Arc<Detector>> {
    state.detector.as_ref().filter(|d| d.is_ready())
}

fn detector_unavailable() -> HttpResponse {
    create_response(503, json!({ "error": "Detector not initialized" }))
}

/// Maps a pipeline failure onto an HTTP status: request-shaped problems are
/// 400, model-shaped problems are 422. Full detail goes to the server log;
/// the caller sees the error summary only.
fn pipeline_error_response(operation: &str, error: &PipelineError) -> HttpResponse {
    eprintln!("✗ {} rejected: {:?}", operation, error);
    let status = match error.kind() {
        ErrorKind::Validation => 400,
        ErrorKind::Computation => 422,
    };
    create_response(status, json!({ "error": error.to_string() }))
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: serde_json::Value) -> HttpResponse {
    let body = serde_json::to_string_pretty(&json).unwrap();
    let bytes = body.into_bytes();

    tiny_http::Response::from_data(bytes)
        .with_status_code(tiny_http::StatusCode::from(status_code))
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
        )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
