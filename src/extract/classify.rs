use serde::{Deserialize, Serialize};

/// Subject suffix of the payment-failure cancellation template.
pub const PAYMENT_FAILURE_SUFFIX: &str = "was canceled 🔴";

/// The kinds of order notification the scan understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Canceled,
    PaymentFailureCanceled,
    Shipped,
    Arrived,
    OrderConfirmation,
}

/// Classify a message by its subject line.
///
/// First match wins; subjects can carry more than one keyword, so the checks
/// run from most to least specific.
pub fn classify(subject: &str) -> MessageKind {
    if subject.contains("Canceled:") {
        MessageKind::Canceled
    } else if subject.trim_end().ends_with(PAYMENT_FAILURE_SUFFIX) {
        MessageKind::PaymentFailureCanceled
    } else if subject.contains("Shipped:") {
        MessageKind::Shipped
    } else if subject.starts_with("Arrived:") || subject.starts_with("Delivered:") {
        MessageKind::Arrived
    } else {
        MessageKind::OrderConfirmation
    }
}
