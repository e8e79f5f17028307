mod common;

use common::{FakeMailbox, arrival, cancellation, confirmation, order_id, raw_message, shipment};
use order_checker::cache::MessageCache;
use order_checker::config::PipelineConfig;
use order_checker::ledger::OrderLedger;
use order_checker::models::OrderStatus;
use order_checker::report::{filter_non_canceled, learn_prices};
use order_checker::scan::{PipelineError, ProgressSink, ScanPipeline, ScanTarget};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink {
    total: Mutex<Option<usize>>,
    processed: Mutex<Vec<usize>>,
}

impl ProgressSink for RecordingSink {
    fn on_total(&self, total: usize) {
        *self.total.lock() = Some(total);
    }

    fn on_processed(&self, processed: usize) {
        self.processed.lock().push(processed);
    }
}

fn config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        max_attempts: 5,
        initial_backoff: Duration::from_millis(1),
    }
}

fn target(mailbox: Arc<FakeMailbox>) -> ScanTarget {
    ScanTarget {
        client: mailbox,
        user: "me".into(),
        query: "from:help@walmart.com newer_than:10d".into(),
    }
}

#[tokio::test]
async fn confirmation_yields_priced_order() {
    let mailbox = Arc::new(FakeMailbox::new().with_message(
        "m1",
        confirmation("2000131-89912005", &[("Widget", 2)], "$20.00"),
    ));
    let ledger = Arc::new(OrderLedger::new());
    let sink = Arc::new(RecordingSink::default());

    let stats = ScanPipeline::new(None, config(8))
        .run(
            &CancellationToken::new(),
            target(mailbox),
            ledger.clone(),
            sink.clone(),
        )
        .await
        .expect("scan succeeds");

    assert_eq!(stats.total, 1);
    assert_eq!(stats.processed, 1);
    assert_eq!(*sink.total.lock(), Some(1));
    assert_eq!(*sink.processed.lock(), vec![1]);

    let snapshot = ledger.snapshot();
    let order = &snapshot.orders[&order_id("2000131-89912005")];
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.total, "$20.00");

    let non_canceled = filter_non_canceled(&snapshot.orders);
    let learned = learn_prices(&non_canceled);
    assert_eq!(learned.get("Widget"), Some(&10.0));
}

#[tokio::test]
async fn cancellation_wins_in_either_order() {
    let number = "2000131-89912005";
    let orderings = [
        vec![
            ("a", confirmation(number, &[("Widget", 1)], "$10.00")),
            ("b", cancellation(number)),
        ],
        vec![
            ("b", cancellation(number)),
            ("a", confirmation(number, &[("Widget", 1)], "$10.00")),
        ],
    ];

    for messages in orderings {
        let mailbox = messages
            .into_iter()
            .fold(FakeMailbox::new(), |mailbox, (id, raw)| {
                mailbox.with_message(id, raw)
            });
        let ledger = Arc::new(OrderLedger::new());

        ScanPipeline::new(None, config(1))
            .run(
                &CancellationToken::new(),
                target(Arc::new(mailbox)),
                ledger.clone(),
                Arc::new(RecordingSink::default()),
            )
            .await
            .expect("scan succeeds");

        let snapshot = ledger.snapshot();
        let order = &snapshot.orders[&order_id(number)];
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total, "$10.00");
    }
}

#[tokio::test]
async fn transient_failures_within_budget_lose_nothing() {
    let mut mailbox = FakeMailbox::new().with_page_size(7);
    for i in 1..=100 {
        let number = format!("2000131-{i:08}");
        let raw = confirmation(&number, &[("Widget", 1)], "$10.00");
        mailbox = mailbox.with_message(&format!("m{i}"), raw);
    }
    let mailbox = Arc::new(mailbox.failing_transiently("m50", 2));
    let ledger = Arc::new(OrderLedger::new());

    let stats = ScanPipeline::new(None, config(8))
        .run(
            &CancellationToken::new(),
            target(mailbox.clone()),
            ledger.clone(),
            Arc::new(RecordingSink::default()),
        )
        .await
        .expect("scan succeeds");

    assert_eq!(stats.total, 100);
    assert_eq!(stats.processed, 100);
    assert_eq!(stats.failed, 0);
    assert_eq!(ledger.order_count(), 100);
    assert!(ledger.snapshot().orders.contains_key(&order_id("2000131-00000050")));
    assert_eq!(mailbox.fetch_count(), 102);
}

#[tokio::test]
async fn exhausted_retry_budget_skips_only_that_message() {
    let mut mailbox = FakeMailbox::new();
    for i in 1..=10 {
        let number = format!("2000131-{i:08}");
        let raw = confirmation(&number, &[("Widget", 1)], "$10.00");
        mailbox = mailbox.with_message(&format!("m{i}"), raw);
    }
    let mailbox = Arc::new(mailbox.failing_transiently("m4", 50));
    let ledger = Arc::new(OrderLedger::new());
    let sink = Arc::new(RecordingSink::default());

    let stats = ScanPipeline::new(None, config(3))
        .run(
            &CancellationToken::new(),
            target(mailbox.clone()),
            ledger.clone(),
            sink.clone(),
        )
        .await
        .expect("a message out of retries does not fail the scan");

    assert_eq!(stats.total, 10);
    assert_eq!(stats.processed, 10);
    assert_eq!(stats.failed, 1);
    assert_eq!(ledger.order_count(), 9);
    assert!(!ledger.snapshot().orders.contains_key(&order_id("2000131-00000004")));
    // Five attempts on the failing message, one on each of the others.
    assert_eq!(mailbox.fetch_count(), 9 + 5);
    assert_eq!(sink.processed.lock().len(), 10);
}

#[tokio::test]
async fn failed_messages_are_skipped_and_counted() {
    let mailbox = Arc::new(
        FakeMailbox::new()
            .with_message("ok", confirmation("2000131-00000001", &[("Widget", 1)], "$10.00"))
            .with_message("gone", confirmation("2000131-00000002", &[("Widget", 1)], "$10.00"))
            .with_message("no-anchor", raw_message("thanks for your order", Some("<p>hi</p>")))
            .failing_permanently("gone"),
    );
    let ledger = Arc::new(OrderLedger::new());
    let sink = Arc::new(RecordingSink::default());

    let stats = ScanPipeline::new(None, config(2))
        .run(
            &CancellationToken::new(),
            target(mailbox),
            ledger.clone(),
            sink.clone(),
        )
        .await
        .expect("per-message failures do not fail the scan");

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failed, 2);
    assert_eq!(ledger.order_count(), 1);
    assert_eq!(sink.processed.lock().len(), 3);
}

#[tokio::test]
async fn shipments_dedup_and_arrivals_mark_delivery() {
    let number = "2000131-00000001";
    let mailbox = Arc::new(
        FakeMailbox::new()
            .with_message("s1", shipment(number, "7777"))
            .with_message("s2", shipment(number, "7777"))
            .with_message("d1", arrival(number))
            .with_message("d2", arrival(number)),
    );
    let ledger = Arc::new(OrderLedger::new());

    ScanPipeline::new(None, config(4))
        .run(
            &CancellationToken::new(),
            target(mailbox),
            ledger.clone(),
            Arc::new(RecordingSink::default()),
        )
        .await
        .expect("scan succeeds");

    let snapshot = ledger.snapshot();
    assert_eq!(snapshot.shipped.len(), 2);
    assert!(
        snapshot
            .shipped
            .iter()
            .any(|s| s.tracking_number == "7777" && s.carrier == "FedEx")
    );
    assert!(
        snapshot
            .shipped
            .iter()
            .any(|s| s.is_delivered_marker() && s.id == order_id(number))
    );
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let mailbox = Arc::new(FakeMailbox::new().failing_listing());
    let result = ScanPipeline::new(None, config(2))
        .run(
            &CancellationToken::new(),
            target(mailbox),
            Arc::new(OrderLedger::new()),
            Arc::new(RecordingSink::default()),
        )
        .await;

    assert!(matches!(result, Err(PipelineError::Listing(_))));
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(
        MessageCache::open(&dir.path().join("messages.db"), Duration::from_secs(3600))
            .await
            .unwrap(),
    );
    let pipeline = ScanPipeline::new(Some(cache.clone()), config(4));

    let mut mailbox = FakeMailbox::new();
    for i in 1..=5 {
        let number = format!("2000131-{i:08}");
        let raw = confirmation(&number, &[("Widget", 1)], "$10.00");
        mailbox = mailbox.with_message(&format!("m{i}"), raw);
    }
    let mailbox = Arc::new(mailbox);

    let first = pipeline
        .run(
            &CancellationToken::new(),
            target(mailbox.clone()),
            Arc::new(OrderLedger::new()),
            Arc::new(RecordingSink::default()),
        )
        .await
        .unwrap();
    assert_eq!(first.cache_hits, 0);
    assert_eq!(mailbox.fetch_count(), 5);

    let ledger = Arc::new(OrderLedger::new());
    let second = pipeline
        .run(
            &CancellationToken::new(),
            target(mailbox.clone()),
            ledger.clone(),
            Arc::new(RecordingSink::default()),
        )
        .await
        .unwrap();
    assert_eq!(second.cache_hits, 5);
    assert_eq!(mailbox.fetch_count(), 5);
    assert_eq!(ledger.order_count(), 5);
    assert_eq!(cache.stats().await.unwrap().count, 5);
}

#[tokio::test]
async fn cancellation_returns_promptly() {
    let mailbox = Arc::new(
        FakeMailbox::new()
            .with_message("ok", confirmation("2000131-00000001", &[("Widget", 1)], "$10.00"))
            .with_message("stuck", confirmation("2000131-00000002", &[("Widget", 1)], "$10.00"))
            .hanging_on("stuck"),
    );
    let ledger = Arc::new(OrderLedger::new());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        ScanPipeline::new(None, config(1)).run(
            &token,
            target(mailbox),
            ledger.clone(),
            Arc::new(RecordingSink::default()),
        ),
    )
    .await
    .expect("run returns after cancellation");

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(ledger.order_count(), 1);
}
