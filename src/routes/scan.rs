//! Scan lifecycle endpoints: start, poll, cancel.

use crate::error::ApiError;
use crate::mail::MailClientProvider;
use crate::scan::{ScanProgress, ScanRequest, ScanService};
use rocket::{State, get, post, serde::json::Json};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_USER: &str = "me";

/// Request body for starting a scan.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct StartScanRequest {
    /// Trailing days to scan. Zero or negative selects the default window.
    #[serde(default)]
    pub days: Option<i64>,
    /// Drop every cached extraction result before scanning.
    #[serde(default)]
    pub clear_cache: bool,
    /// Mailbox to scan; the authenticated user when omitted.
    #[serde(default)]
    pub user: Option<String>,
}

impl StartScanRequest {
    fn into_scan_request(self) -> ScanRequest {
        let days = self
            .days
            .filter(|days| *days > 0)
            .map(|days| u32::try_from(days).unwrap_or(u32::MAX));

        ScanRequest {
            user: self
                .user
                .filter(|user| !user.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            days,
            clear_cache: self.clear_cache,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct StartScanResponse {
    pub scan_id: String,
    pub days: Option<u32>,
    pub message: String,
}

/// Start a scan. Rejected with 409 while another scan is running.
#[openapi(tag = "Scan")]
#[post("/scan", data = "<request>")]
pub async fn start_scan(
    request: Json<StartScanRequest>,
    scans: &State<ScanService>,
    provider: &State<Arc<dyn MailClientProvider>>,
) -> Result<Json<StartScanResponse>, ApiError> {
    if scans.status().in_progress {
        return Err(crate::scan::ScanError::AlreadyRunning.into());
    }

    let request = request.into_inner().into_scan_request();
    let client = provider.mail_client(&request.user).await?;
    let handle = scans.start(client, request)?;
    let progress = scans.status();

    Ok(Json(StartScanResponse {
        scan_id: handle.scan_id,
        days: progress.days,
        message: "Scan started".to_string(),
    }))
}

/// Progress of the current or most recent scan.
#[openapi(tag = "Scan")]
#[get("/scan/status")]
pub fn scan_status(scans: &State<ScanService>) -> Json<ScanProgress> {
    Json(scans.status())
}

/// Cancel the running scan; results merged so far stay available.
#[openapi(tag = "Scan")]
#[post("/scan/cancel")]
pub fn cancel_scan(scans: &State<ScanService>) -> Result<Json<ScanProgress>, ApiError> {
    Ok(Json(scans.cancel()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let request = StartScanRequest::default().into_scan_request();
        assert_eq!(request.user, "me");
        assert_eq!(request.days, None);
        assert!(!request.clear_cache);

        let request = StartScanRequest {
            days: Some(-3),
            clear_cache: true,
            user: Some("  ".into()),
        }
        .into_scan_request();
        assert_eq!(request.days, None);
        assert_eq!(request.user, "me");
        assert!(request.clear_cache);

        let request = StartScanRequest {
            days: Some(10_000_000_000),
            ..Default::default()
        }
        .into_scan_request();
        assert_eq!(request.days, Some(u32::MAX));
    }
}
