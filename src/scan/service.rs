use super::pipeline::{ScanPipeline, ScanTarget};
use super::progress::{ScanProgress, ScanSession, SessionProgress, SharedSession};
use super::watchdog::spawn_watchdog;
use crate::config::{WatchdogConfig, WindowConfig};
use crate::ledger::LedgerSnapshot;
use crate::mail::{MailClient, ScanWindow};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub user: String,
    /// Requested window; clamped to the configured bounds.
    pub days: Option<u32>,
    pub clear_cache: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    AlreadyRunning,
    #[error("no scan is in progress")]
    NotRunning,
    #[error("scan results are not available until the scan finishes")]
    StillRunning,
    #[error("no scan has been run yet")]
    NoResults,
}

/// Handle on a started scan.
pub struct ScanHandle {
    pub scan_id: String,
    task: JoinHandle<()>,
    session: SharedSession,
}

impl ScanHandle {
    /// Wait for the run task to end and return the final progress.
    pub async fn wait(self) -> ScanProgress {
        if let Err(e) = self.task.await {
            log::error!("scan task {} terminated abnormally: {}", self.scan_id, e);
        }
        self.session.lock().snapshot()
    }
}

/// Owns the single scan session and starts runs against it.
///
/// Only one scan runs at a time; a start request while one is running is
/// rejected rather than queued. The ledger of the last scan stays readable
/// after it ends, whatever the outcome.
pub struct ScanService {
    session: SharedSession,
    pipeline: ScanPipeline,
    watchdog: WatchdogConfig,
    window: WindowConfig,
}

impl ScanService {
    pub fn new(pipeline: ScanPipeline, watchdog: WatchdogConfig, window: WindowConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(ScanSession::new())),
            pipeline,
            watchdog,
            window,
        }
    }

    pub fn start(
        &self,
        client: Arc<dyn MailClient>,
        request: ScanRequest,
    ) -> Result<ScanHandle, ScanError> {
        let window = ScanWindow::from_request(request.days, &self.window);

        let (scan_id, token, ledger) = {
            let mut session = self.session.lock();
            if session.progress.state.is_running() {
                return Err(ScanError::AlreadyRunning);
            }
            session.begin(&request.user, window.days())
        };

        log::info!(
            "starting scan {} for {} over {} days",
            scan_id,
            request.user,
            window.days()
        );

        let target = ScanTarget {
            client,
            user: request.user,
            query: window.query(&self.window.sender),
        };

        spawn_watchdog(self.session.clone(), scan_id.clone(), self.watchdog.clone());

        let pipeline = self.pipeline.clone();
        let session = self.session.clone();
        let run_id = scan_id.clone();
        let clear_cache = request.clear_cache;

        let task = tokio::spawn(async move {
            if clear_cache {
                if let Some(cache) = pipeline.cache() {
                    if let Err(e) = cache.clear().await {
                        log::warn!("failed to clear cache before scan: {}", e);
                    }
                }
            }

            let sink = Arc::new(SessionProgress::new(session.clone(), run_id.clone()));
            let outcome = pipeline.run(&token, target, ledger, sink).await;
            session.lock().finish(&run_id, outcome);
        });

        Ok(ScanHandle {
            scan_id,
            task,
            session: self.session.clone(),
        })
    }

    pub fn status(&self) -> ScanProgress {
        self.session.lock().snapshot()
    }

    /// Stop the running scan. Whatever was merged so far stays readable.
    pub fn cancel(&self) -> Result<ScanProgress, ScanError> {
        let mut session = self.session.lock();
        if !session.progress.state.is_running() {
            return Err(ScanError::NotRunning);
        }
        log::info!("cancelling scan {:?}", session.progress.scan_id);
        session.cancel();
        Ok(session.snapshot())
    }

    /// Ledger of the most recent finished scan.
    pub fn results(&self) -> Result<LedgerSnapshot, ScanError> {
        let session = self.session.lock();
        if session.progress.scan_id.is_none() {
            return Err(ScanError::NoResults);
        }
        if session.progress.state.is_running() {
            return Err(ScanError::StillRunning);
        }
        Ok(session.ledger.snapshot())
    }

    pub fn window_config(&self) -> &WindowConfig {
        &self.window
    }
}
