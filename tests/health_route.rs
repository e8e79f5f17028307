use order_checker::config::{PipelineConfig, WatchdogConfig, WindowConfig};
use order_checker::routes::health::{HealthResponse, health_check};
use order_checker::scan::{ScanPipeline, ScanService, ScanState};
use order_checker::test_support::TestRocketBuilder;
use rocket::http::Status;
use rocket::routes;

#[test]
fn health_endpoint_returns_ok() {
    let scans = ScanService::new(
        ScanPipeline::new(None, PipelineConfig::default()),
        WatchdogConfig::default(),
        WindowConfig::default(),
    );
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![health_check])
        .manage_scan_service(scans)
        .blocking_client();

    let response = client.get("/api/v1/health").dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: HealthResponse = response.into_json().expect("valid JSON payload");
    assert_eq!(payload.status, "ok");
    assert_eq!(payload.scan_state, ScanState::Idle);
}
