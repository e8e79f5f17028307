mod common;

use common::{FakeMailbox, confirmation, order_id};
use order_checker::config::{PipelineConfig, WatchdogConfig, WindowConfig};
use order_checker::scan::{ScanError, ScanPipeline, ScanRequest, ScanService, ScanState};
use std::sync::Arc;
use std::time::Duration;

fn service(watchdog: WatchdogConfig) -> ScanService {
    let pipeline = ScanPipeline::new(
        None,
        PipelineConfig {
            workers: 1,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        },
    );
    ScanService::new(pipeline, watchdog, WindowConfig::default())
}

fn request(days: Option<u32>) -> ScanRequest {
    ScanRequest {
        user: "me".into(),
        days,
        clear_cache: false,
    }
}

fn hanging_mailbox() -> Arc<FakeMailbox> {
    Arc::new(
        FakeMailbox::new()
            .with_message("ok", confirmation("2000131-00000001", &[("Widget", 1)], "$10.00"))
            .with_message("stuck", confirmation("2000131-00000002", &[("Widget", 1)], "$10.00"))
            .hanging_on("stuck"),
    )
}

#[tokio::test]
async fn completed_scan_reports_counts() {
    let scans = service(WatchdogConfig::default());
    let mailbox = Arc::new(
        FakeMailbox::new()
            .with_message("a", confirmation("2000131-00000001", &[("Widget", 2)], "$20.00"))
            .with_message("b", confirmation("2000131-00000002", &[("Gadget", 1)], "$5.00")),
    );

    assert!(matches!(scans.results(), Err(ScanError::NoResults)));

    let progress = scans.start(mailbox, request(Some(30))).unwrap().wait().await;

    assert_eq!(progress.state, ScanState::Completed);
    assert!(!progress.in_progress);
    assert_eq!(progress.total_messages, 2);
    assert_eq!(progress.processed, 2);
    assert_eq!(progress.orders, 2);
    assert_eq!(progress.days, Some(30));
    assert_eq!(progress.current_user.as_deref(), Some("me"));
    assert!(progress.finished_at.is_some());
    assert_eq!(progress.stats.map(|s| s.failed), Some(0));

    let snapshot = scans.results().unwrap();
    assert!(snapshot.orders.contains_key(&order_id("2000131-00000002")));
}

#[tokio::test]
async fn requested_window_is_clamped() {
    let scans = service(WatchdogConfig::default());
    let progress = scans
        .start(Arc::new(FakeMailbox::new()), request(Some(10_000)))
        .unwrap()
        .wait()
        .await;

    assert_eq!(progress.days, Some(WindowConfig::default().max_days));
    assert_eq!(progress.state, ScanState::Completed);
}

#[tokio::test]
async fn stalled_scan_times_out_with_partial_results() {
    let scans = service(WatchdogConfig {
        poll_interval: Duration::from_millis(20),
        stall_timeout: Duration::from_millis(100),
    });

    let handle = scans.start(hanging_mailbox(), request(None)).unwrap();
    let progress = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("watchdog ends the scan");

    assert_eq!(progress.state, ScanState::TimedOut);
    assert!(!progress.in_progress);
    assert_eq!(
        progress.error.as_deref(),
        Some("Scan timed out - no progress for 100 ms")
    );

    let snapshot = scans.results().unwrap();
    assert_eq!(snapshot.orders.len(), 1);
    assert!(snapshot.orders.contains_key(&order_id("2000131-00000001")));
}

#[tokio::test]
async fn slow_scan_that_keeps_progressing_is_not_timed_out() {
    let scans = service(WatchdogConfig {
        poll_interval: Duration::from_millis(10),
        stall_timeout: Duration::from_millis(100),
    });

    let mut mailbox = FakeMailbox::new().with_fetch_delay(Duration::from_millis(40));
    for i in 1..=8 {
        let number = format!("2000131-{i:08}");
        let raw = confirmation(&number, &[("Widget", 1)], "$10.00");
        mailbox = mailbox.with_message(&format!("m{i}"), raw);
    }

    let started = std::time::Instant::now();
    let progress = scans
        .start(Arc::new(mailbox), request(None))
        .unwrap()
        .wait()
        .await;

    // One worker at 40ms a message outlasts the stall threshold overall.
    assert!(started.elapsed() > Duration::from_millis(100));
    assert_eq!(progress.state, ScanState::Completed);
    assert_eq!(progress.error, None);
    assert_eq!(progress.processed, 8);
    assert_eq!(progress.orders, 8);
}

#[tokio::test]
async fn only_one_scan_runs_at_a_time() {
    let scans = service(WatchdogConfig::default());

    let first = scans.start(hanging_mailbox(), request(None)).unwrap();

    let second = scans.start(hanging_mailbox(), request(None));
    assert!(matches!(second, Err(ScanError::AlreadyRunning)));
    assert!(matches!(scans.results(), Err(ScanError::StillRunning)));

    let cancelled = scans.cancel().unwrap();
    assert_eq!(cancelled.state, ScanState::Cancelled);
    assert!(!cancelled.in_progress);

    let finished = tokio::time::timeout(Duration::from_secs(5), first.wait())
        .await
        .expect("cancelled scan stops");
    assert_eq!(finished.state, ScanState::Cancelled);
    assert!(matches!(scans.cancel(), Err(ScanError::NotRunning)));

    let restarted = scans
        .start(Arc::new(FakeMailbox::new()), request(None))
        .unwrap()
        .wait()
        .await;
    assert_eq!(restarted.state, ScanState::Completed);
    assert_ne!(restarted.scan_id, finished.scan_id);
}

#[tokio::test]
async fn listing_failure_marks_scan_failed() {
    let scans = service(WatchdogConfig::default());
    let progress = scans
        .start(Arc::new(FakeMailbox::new().failing_listing()), request(None))
        .unwrap()
        .wait()
        .await;

    assert_eq!(progress.state, ScanState::Failed);
    assert!(progress.error.unwrap().contains("failed to list messages"));
    assert!(scans.results().unwrap().orders.is_empty());
}
