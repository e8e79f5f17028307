//! Lightweight service health endpoint used for readiness checks and tests.

use crate::scan::{ScanService, ScanState};
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    /// Static status string reporting application readiness.
    pub status: String,
    /// State of the current or most recent scan.
    pub scan_state: ScanState,
}

#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(scans: &State<ScanService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        scan_state: scans.status().state,
    })
}
