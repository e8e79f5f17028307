use crate::config::PipelineConfig;
use crate::mail::MailError;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("cancelled")]
    Cancelled,
}

/// Run an upstream call, retrying transient failures with doubling backoff.
///
/// At most `config.max_attempts` calls are made. Permanent errors return
/// immediately. Cancellation is observed both during a call and while
/// waiting to retry.
pub async fn with_retry<T, F, Fut>(
    config: &PipelineConfig,
    token: &CancellationToken,
    what: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MailError>>,
{
    let mut backoff = config.initial_backoff;
    let mut attempt = 1;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RetryError::Cancelled),
            outcome = op() => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_attempts => {
                log::debug!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    what,
                    attempt,
                    config.max_attempts,
                    err,
                    backoff
                );
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(RetryError::Mail(err)),
        }
    }
}
