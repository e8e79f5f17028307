//! Worker-pool ingestion of one scan window.
//!
//! ## Flow
//!
//! 1. Page through the upstream listing until exhausted and report the total.
//! 2. Feed message IDs into a bounded channel drained by a fixed pool of
//!    workers.
//! 3. Each worker resolves a message (cache, else fetch with retry, decode,
//!    classify, extract, cache), merges the result into the ledger, then
//!    bumps the processed counter.
//!
//! A failed message is logged and counted as processed; it never aborts the
//! scan. Only a listing failure or cancellation ends a run with an error.

use super::retry::{RetryError, with_retry};
use crate::cache::MessageCache;
use crate::config::PipelineConfig;
use crate::extract::{ExtractError, extract_message};
use crate::ledger::OrderLedger;
use crate::mail::parser::ParseMessageError;
use crate::mail::{MailClient, MailError, parse_message};
use crate::models::CachedResult;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Receives progress from a running pipeline.
pub trait ProgressSink: Send + Sync {
    fn on_total(&self, total: usize);
    fn on_processed(&self, processed: usize);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to list messages: {0}")]
    Listing(#[source] MailError),
    #[error("scan cancelled")]
    Cancelled,
}

/// Why a single message contributed nothing.
#[derive(Debug, Error)]
enum MessageError {
    #[error("fetch failed: {0}")]
    Fetch(#[source] MailError),
    #[error(transparent)]
    Parse(#[from] ParseMessageError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("cancelled")]
    Cancelled,
}

impl From<RetryError> for MessageError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Mail(e) => MessageError::Fetch(e),
            RetryError::Cancelled => MessageError::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PipelineStats {
    pub total: usize,
    pub processed: usize,
    pub cache_hits: usize,
    pub failed: usize,
}

/// Who and what a run is scanning.
#[derive(Clone)]
pub struct ScanTarget {
    pub client: Arc<dyn MailClient>,
    pub user: String,
    pub query: String,
}

#[derive(Clone)]
pub struct ScanPipeline {
    cache: Option<Arc<MessageCache>>,
    config: PipelineConfig,
}

impl ScanPipeline {
    pub fn new(cache: Option<Arc<MessageCache>>, config: PipelineConfig) -> Self {
        Self { cache, config }
    }

    pub fn cache(&self) -> Option<&Arc<MessageCache>> {
        self.cache.as_ref()
    }

    /// Ingest every message matching `target` into `ledger`.
    ///
    /// On cancellation the ledger keeps whatever was merged before the signal.
    pub async fn run(
        &self,
        token: &CancellationToken,
        target: ScanTarget,
        ledger: Arc<OrderLedger>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<PipelineStats, PipelineError> {
        let ids = self.list_all(token, &target).await?;
        let total = ids.len();
        sink.on_total(total);
        log::info!("scan for {}: {} messages to process", target.user, total);

        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel::<String>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));

        let shared = Arc::new(Worker {
            cache: self.cache.clone(),
            config: self.config.clone(),
            target,
            ledger,
            sink,
            token: token.clone(),
            processed: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let worker = shared.clone();
            let rx = rx.clone();
            pool.spawn(async move { worker.run(worker_id, rx).await });
        }

        for id in ids {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                sent = tx.send(id) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                log::error!("scan worker terminated abnormally: {}", e);
            }
        }

        if token.is_cancelled() {
            log::info!(
                "scan cancelled after {} of {} messages",
                shared.processed.load(Ordering::SeqCst),
                total
            );
            return Err(PipelineError::Cancelled);
        }

        let stats = PipelineStats {
            total,
            processed: shared.processed.load(Ordering::SeqCst),
            cache_hits: shared.cache_hits.load(Ordering::SeqCst),
            failed: shared.failed.load(Ordering::SeqCst),
        };
        log::info!(
            "scan complete: {} processed, {} from cache, {} failed",
            stats.processed,
            stats.cache_hits,
            stats.failed
        );
        Ok(stats)
    }

    async fn list_all(
        &self,
        token: &CancellationToken,
        target: &ScanTarget,
    ) -> Result<Vec<String>, PipelineError> {
        let client = target.client.as_ref();
        let user = target.user.as_str();
        let query = target.query.as_str();

        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let current = page_token.take();
            let current = current.as_deref();
            let page = with_retry(&self.config, token, "list messages", move || {
                client.list_messages(user, query, current)
            })
            .await
            .map_err(|e| match e {
                RetryError::Mail(e) => PipelineError::Listing(e),
                RetryError::Cancelled => PipelineError::Cancelled,
            })?;

            ids.extend(page.ids);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}

struct Worker {
    cache: Option<Arc<MessageCache>>,
    config: PipelineConfig,
    target: ScanTarget,
    ledger: Arc<OrderLedger>,
    sink: Arc<dyn ProgressSink>,
    token: CancellationToken,
    processed: AtomicUsize,
    cache_hits: AtomicUsize,
    failed: AtomicUsize,
}

impl Worker {
    async fn run(&self, worker_id: usize, jobs: Arc<Mutex<mpsc::Receiver<String>>>) {
        log::debug!("scan worker {} started", worker_id);

        loop {
            let next = {
                let mut jobs = jobs.lock().await;
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => None,
                    id = jobs.recv() => id,
                }
            };
            let Some(message_id) = next else {
                break;
            };
            self.process(&message_id).await;
        }

        log::debug!("scan worker {} stopped", worker_id);
    }

    async fn process(&self, message_id: &str) {
        match self.resolve(message_id).await {
            Ok(result) => {
                // Workers that see the signal late must not touch the ledger.
                if self.token.is_cancelled() {
                    return;
                }
                self.ledger.apply(result);
            }
            Err(MessageError::Cancelled) => return,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                log::warn!("skipping message {}: {}", message_id, e);
            }
        }

        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.on_processed(processed);
    }

    async fn resolve(&self, message_id: &str) -> Result<CachedResult, MessageError> {
        if let Some(cache) = &self.cache {
            match cache.get(message_id).await {
                Ok(Some(hit)) => {
                    self.cache_hits.fetch_add(1, Ordering::SeqCst);
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => log::warn!("cache lookup failed for {}: {}", message_id, e),
            }
        }

        let client = self.target.client.as_ref();
        let user = self.target.user.as_str();
        let raw = with_retry(&self.config, &self.token, "fetch message", move || {
            client.get_message(user, message_id)
        })
        .await?;

        log::debug!("fetched message {} ({} bytes)", raw.id, raw.raw.len());
        let result = decode_and_extract(&raw.id, &raw.raw)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(message_id, &result).await {
                log::warn!("failed to cache result for {}: {}", message_id, e);
            }
        }

        Ok(result)
    }
}

fn decode_and_extract(message_id: &str, raw: &[u8]) -> Result<CachedResult, MessageError> {
    let message = parse_message(raw)?;
    let (kind, result) = extract_message(&message)?;
    log::debug!("message {} classified as {:?}", message_id, kind);
    Ok(result)
}
