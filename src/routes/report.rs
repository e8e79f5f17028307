use crate::error::ApiError;
use crate::report::{ScanReport, build_report};
use crate::scan::ScanService;
use chrono::Utc;
use rocket::{State, get, serde::json::Json};
use rocket_okapi::openapi;

/// Analytics over the ledger of the most recent finished scan.
#[openapi(tag = "Report")]
#[get("/report")]
pub fn get_report(scans: &State<ScanService>) -> Result<Json<ScanReport>, ApiError> {
    let snapshot = scans.results()?;
    let progress = scans.status();
    let days = progress
        .days
        .unwrap_or(scans.window_config().default_days);

    Ok(Json(build_report(
        &snapshot,
        progress.total_messages,
        days,
        Utc::now().date_naive(),
    )))
}
