//! Turning notification messages into order data.
//!
//! - **`classify`**: subject-line dispatch to a [`MessageKind`].
//! - **`dom`**: defensive structural queries over the HTML body.
//! - **`strategies`**: one [`Extractor`] per message kind.
//!
//! Extraction is pure. Missing fields degrade to empty values; only a missing
//! order number (or a missing body where one is needed) fails a message.

pub mod classify;
pub mod dom;
pub mod strategies;

use crate::mail::ParsedMessage;
use crate::models::CachedResult;
use thiserror::Error;

pub use classify::{MessageKind, classify};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("order number not found")]
    MissingOrderId,
    #[error("message has no HTML body")]
    MissingHtml,
}

/// Extraction strategy for one message kind.
pub trait Extractor: Send + Sync {
    fn extract(&self, subject: &str, html: Option<&str>) -> Result<CachedResult, ExtractError>;
}

static SUBJECT_CANCELLATION: strategies::SubjectCancellation = strategies::SubjectCancellation;
static PAYMENT_FAILURE: strategies::PaymentFailureCancellation =
    strategies::PaymentFailureCancellation;
static SHIPMENT: strategies::ShipmentNotice = strategies::ShipmentNotice;
static ARRIVAL: strategies::ArrivalNotice = strategies::ArrivalNotice;
static CONFIRMATION: strategies::OrderConfirmation = strategies::OrderConfirmation;

pub fn extractor_for(kind: MessageKind) -> &'static dyn Extractor {
    match kind {
        MessageKind::Canceled => &SUBJECT_CANCELLATION,
        MessageKind::PaymentFailureCanceled => &PAYMENT_FAILURE,
        MessageKind::Shipped => &SHIPMENT,
        MessageKind::Arrived => &ARRIVAL,
        MessageKind::OrderConfirmation => &CONFIRMATION,
    }
}

/// Classify a decoded message and run the matching strategy.
pub fn extract_message(
    message: &ParsedMessage,
) -> Result<(MessageKind, CachedResult), ExtractError> {
    let kind = classify(&message.subject);
    let result = extractor_for(kind).extract(&message.subject, message.html.as_deref())?;
    Ok((kind, result))
}
