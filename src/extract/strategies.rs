//! One extraction strategy per message kind.

use super::dom;
use super::{ExtractError, Extractor};
use crate::models::{CachedResult, Order, OrderStatus, ShippedOrder};
use scraper::Html;

fn parse_html(html: Option<&str>) -> Result<Html, ExtractError> {
    match html {
        Some(body) if !body.trim().is_empty() => Ok(Html::parse_document(body)),
        _ => Err(ExtractError::MissingHtml),
    }
}

fn require_id(id: Option<String>) -> Result<String, ExtractError> {
    id.filter(|id| !id.is_empty())
        .ok_or(ExtractError::MissingOrderId)
}

/// `Canceled: delivery from order #2000131-89912005`: the order number is in
/// the subject, the body is never read.
pub struct SubjectCancellation;

impl SubjectCancellation {
    fn order_id(subject: &str) -> Option<String> {
        let (_, tail) = subject.split_once('#')?;
        let token = tail.split_whitespace().next()?;
        Some(dom::normalize_order_id(token))
    }
}

impl Extractor for SubjectCancellation {
    fn extract(&self, subject: &str, _html: Option<&str>) -> Result<CachedResult, ExtractError> {
        let id = require_id(Self::order_id(subject))?;
        Ok(CachedResult::from_order(Order::canceled(id)))
    }
}

/// Cancellation after a failed payment; the order number is in the body.
pub struct PaymentFailureCancellation;

impl Extractor for PaymentFailureCancellation {
    fn extract(&self, _subject: &str, html: Option<&str>) -> Result<CachedResult, ExtractError> {
        let doc = parse_html(html)?;
        let id = require_id(dom::order_number(&doc))?;
        Ok(CachedResult::from_order(Order::canceled(id)))
    }
}

pub struct ShipmentNotice;

impl Extractor for ShipmentNotice {
    fn extract(&self, _subject: &str, html: Option<&str>) -> Result<CachedResult, ExtractError> {
        let doc = parse_html(html)?;
        let id = require_id(dom::order_number(&doc))?;

        let tracking = dom::tracking_numbers(&doc);
        let arrivals = dom::arrival_dates(&doc);
        let carrier = dom::carrier(&doc);

        // Paired by position; the template carries no explicit correlation key.
        let shipped = tracking
            .into_iter()
            .zip(arrivals)
            .filter(|(number, _)| !number.is_empty())
            .map(|(tracking_number, estimated_arrival)| ShippedOrder {
                id: id.clone(),
                tracking_number,
                carrier: carrier.clone(),
                estimated_arrival,
            })
            .collect();

        Ok(CachedResult::from_shipments(shipped))
    }
}

/// `Arrived:` / `Delivered:` notices, recorded as a delivered marker.
pub struct ArrivalNotice;

impl Extractor for ArrivalNotice {
    fn extract(&self, _subject: &str, html: Option<&str>) -> Result<CachedResult, ExtractError> {
        let doc = parse_html(html)?;
        let id = require_id(dom::delivered_order_number(&doc))?;
        Ok(CachedResult::from_shipments(vec![ShippedOrder::delivered(id)]))
    }
}

pub struct OrderConfirmation;

impl OrderConfirmation {
    fn status(subject: &str) -> OrderStatus {
        if subject.to_lowercase().contains("preorder") {
            OrderStatus::PreOrdered
        } else {
            OrderStatus::Confirmed
        }
    }
}

impl Extractor for OrderConfirmation {
    fn extract(&self, subject: &str, html: Option<&str>) -> Result<CachedResult, ExtractError> {
        let doc = parse_html(html)?;
        let id = require_id(dom::order_number(&doc))?;
        let (order_date, order_date_parsed) = dom::order_date(&doc);

        Ok(CachedResult::from_order(Order {
            id,
            items: dom::items(&doc),
            total: dom::total(&doc),
            order_date,
            order_date_parsed,
            status: Self::status(subject),
        }))
    }
}
