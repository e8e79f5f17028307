use super::pipeline::{PipelineError, PipelineStats, ProgressSink};
use crate::ledger::OrderLedger;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const CANCELLED_MESSAGE: &str = "Scan cancelled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl ScanState {
    pub fn is_running(self) -> bool {
        self == ScanState::Running
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ScanProgress {
    pub scan_id: Option<String>,
    pub state: ScanState,
    pub in_progress: bool,
    pub total_messages: usize,
    pub processed: usize,
    pub current_user: Option<String>,
    pub days: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub orders: usize,
    pub shipped: usize,
    pub error: Option<String>,
    pub stats: Option<PipelineStats>,
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self {
            scan_id: None,
            state: ScanState::Idle,
            in_progress: false,
            total_messages: 0,
            processed: 0,
            current_user: None,
            days: None,
            started_at: None,
            finished_at: None,
            orders: 0,
            shipped: 0,
            error: None,
            stats: None,
        }
    }
}

/// The single scan session owned by the service.
pub(crate) struct ScanSession {
    pub(crate) progress: ScanProgress,
    pub(crate) last_progress: Instant,
    pub(crate) ledger: Arc<OrderLedger>,
    pub(crate) cancel: CancellationToken,
}

pub(crate) type SharedSession = Arc<Mutex<ScanSession>>;

impl ScanSession {
    pub(crate) fn new() -> Self {
        Self {
            progress: ScanProgress::default(),
            last_progress: Instant::now(),
            ledger: Arc::new(OrderLedger::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn is_current(&self, scan_id: &str) -> bool {
        self.progress.scan_id.as_deref() == Some(scan_id)
    }

    fn is_running(&self, scan_id: &str) -> bool {
        self.is_current(scan_id) && self.progress.state.is_running()
    }

    /// Reset for a new scan and hand back what the run needs.
    pub(crate) fn begin(
        &mut self,
        user: &str,
        days: u32,
    ) -> (String, CancellationToken, Arc<OrderLedger>) {
        let scan_id = Uuid::new_v4().to_string();
        self.progress = ScanProgress {
            scan_id: Some(scan_id.clone()),
            state: ScanState::Running,
            in_progress: true,
            current_user: Some(user.to_string()),
            days: Some(days),
            started_at: Some(Utc::now()),
            ..ScanProgress::default()
        };
        self.last_progress = Instant::now();
        self.ledger = Arc::new(OrderLedger::new());
        self.cancel = CancellationToken::new();

        (scan_id, self.cancel.clone(), self.ledger.clone())
    }

    fn close(&mut self, state: ScanState, error: Option<String>) {
        self.progress.state = state;
        self.progress.in_progress = false;
        self.progress.error = error;
        self.progress.finished_at = Some(Utc::now());
    }

    /// Record the pipeline outcome unless the scan was already ended.
    pub(crate) fn finish(
        &mut self,
        scan_id: &str,
        outcome: Result<PipelineStats, PipelineError>,
    ) {
        if !self.is_running(scan_id) {
            return;
        }
        match outcome {
            Ok(stats) => {
                self.progress.stats = Some(stats);
                self.close(ScanState::Completed, None);
            }
            Err(PipelineError::Cancelled) => {
                self.close(ScanState::Cancelled, Some(CANCELLED_MESSAGE.to_string()))
            }
            Err(e) => {
                log::error!("scan {} failed: {}", scan_id, e);
                self.close(ScanState::Failed, Some(e.to_string()));
            }
        }
    }

    pub(crate) fn time_out(&mut self, message: String) {
        self.close(ScanState::TimedOut, Some(message));
        self.cancel.cancel();
    }

    pub(crate) fn cancel(&mut self) {
        self.close(ScanState::Cancelled, Some(CANCELLED_MESSAGE.to_string()));
        self.cancel.cancel();
    }

    /// Current progress with ledger counts filled in.
    pub(crate) fn snapshot(&self) -> ScanProgress {
        let mut progress = self.progress.clone();
        progress.orders = self.ledger.order_count();
        progress.shipped = self.ledger.shipment_count();
        progress
    }
}

/// Feeds pipeline progress into the session it was started for.
pub(crate) struct SessionProgress {
    session: SharedSession,
    scan_id: String,
}

impl SessionProgress {
    pub(crate) fn new(session: SharedSession, scan_id: String) -> Self {
        Self { session, scan_id }
    }
}

impl ProgressSink for SessionProgress {
    fn on_total(&self, total: usize) {
        let mut session = self.session.lock();
        if session.is_running(&self.scan_id) {
            session.progress.total_messages = total;
            session.last_progress = Instant::now();
        }
    }

    fn on_processed(&self, processed: usize) {
        let mut session = self.session.lock();
        if session.is_running(&self.scan_id) {
            session.progress.processed = processed;
            session.last_progress = Instant::now();
        }
    }
}
