//! Analytics over a finished ledger.
//!
//! Everything here is a pure function of a [`LedgerSnapshot`]; nothing reads
//! the mailbox or the cache.

use crate::ledger::LedgerSnapshot;
use crate::models::{Order, ShippedOrder};
use chrono::{Days, NaiveDate};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Unit prices keyed by product name.
pub type LearnedPrices = HashMap<String, f64>;

#[derive(Debug, Clone, Serialize, JsonSchema, PartialEq)]
pub struct ProductSummary {
    pub name: String,
    pub image_url: String,
    pub total_units: u32,
    pub total_spent: f64,
    pub price_per_unit: f64,
}

#[derive(Debug, Clone, Serialize, JsonSchema, PartialEq)]
pub struct EmailStats {
    pub total_emails_scanned: usize,
    pub total_orders: usize,
    pub total_canceled: usize,
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, Serialize, JsonSchema, PartialEq)]
pub struct ProductStats {
    pub name: String,
    pub image_url: String,
    pub total_ordered: u32,
    pub total_canceled: u32,
    pub cancel_rate: f64,
}

/// One display row per item of an order.
#[derive(Debug, Clone, Serialize, JsonSchema, PartialEq)]
pub struct OrderLine {
    pub order_id: String,
    pub order_date: String,
    pub image_url: String,
    pub name: String,
    pub quantity: u32,
    pub total: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema, PartialEq)]
pub struct LiveOrderSummary {
    pub orders: usize,
    pub units: u32,
    pub estimated_value: f64,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ScanReport {
    pub orders: Vec<Order>,
    pub shipped: Vec<ShippedOrder>,
    pub email_stats: EmailStats,
    pub live_order_summary: LiveOrderSummary,
    pub live_orders: Vec<OrderLine>,
    pub product_cancel: Vec<ProductStats>,
    pub order_lines: Vec<OrderLine>,
    pub product_spend: Vec<ProductSummary>,
    pub date_range: String,
}

/// Parse an upstream currency string such as `$1,020.50`.
pub fn parse_amount(total: &str) -> Option<f64> {
    let cleaned: String = total
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Insert the separator back into a canonical order ID.
pub fn format_order_id(id: &str) -> String {
    if id.len() > 7 && !id.contains('-') && id.is_char_boundary(7) {
        format!("{}-{}", &id[..7], &id[7..])
    } else {
        id.to_string()
    }
}

fn order_sort(a: &Order, b: &Order) -> Ordering {
    a.order_date_parsed
        .cmp(&b.order_date_parsed)
        .then_with(|| a.id.cmp(&b.id))
}

/// Orders that were not canceled, oldest first.
pub fn filter_non_canceled(orders: &HashMap<String, Order>) -> Vec<&Order> {
    let mut result: Vec<&Order> = orders
        .values()
        .filter(|order| !order.status.is_canceled())
        .collect();
    result.sort_by(|a, b| order_sort(a, b));
    result
}

/// Orders with no shipment or delivery record yet.
pub fn filter_live_orders<'a>(orders: &[&'a Order], shipped: &[ShippedOrder]) -> Vec<&'a Order> {
    let shipped_ids: HashSet<&str> = shipped.iter().map(|s| s.id.as_str()).collect();
    orders
        .iter()
        .copied()
        .filter(|order| !shipped_ids.contains(order.id.as_str()))
        .collect()
}

/// Learn unit prices from orders that contain a single product.
///
/// The first order that teaches a product's price wins.
pub fn learn_prices(orders: &[&Order]) -> LearnedPrices {
    let mut learned = LearnedPrices::new();

    for order in orders {
        let Some(first) = order.items.first() else {
            continue;
        };
        if order.items.iter().any(|item| item.name != first.name) {
            continue;
        }
        if learned.contains_key(&first.name) {
            continue;
        }
        let Some(total) = parse_amount(&order.total) else {
            continue;
        };
        let units = order.total_quantity();
        if units > 0 {
            learned.insert(first.name.clone(), total / f64::from(units));
        }
    }

    learned
}

/// Units bought and money spent per product, biggest spend first.
pub fn product_summaries(orders: &[&Order], learned: &LearnedPrices) -> Vec<ProductSummary> {
    let mut by_name: HashMap<&str, ProductSummary> = HashMap::new();

    for order in orders {
        for item in &order.items {
            let summary = by_name
                .entry(item.name.as_str())
                .or_insert_with(|| ProductSummary {
                    name: item.name.clone(),
                    image_url: item.image_url.clone(),
                    total_units: 0,
                    total_spent: 0.0,
                    price_per_unit: 0.0,
                });
            summary.total_units += item.quantity;
        }
    }

    let mut summaries: Vec<ProductSummary> = by_name
        .into_values()
        .map(|mut summary| {
            if let Some(price) = learned.get(&summary.name) {
                summary.price_per_unit = *price;
                summary.total_spent = price * f64::from(summary.total_units);
            }
            summary
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_spent
            .total_cmp(&a.total_spent)
            .then_with(|| a.name.cmp(&b.name))
    });
    summaries
}

pub fn email_stats(orders: &HashMap<String, Order>, total_emails_scanned: usize) -> EmailStats {
    let total_orders = orders.len();
    let total_canceled = orders
        .values()
        .filter(|order| order.status.is_canceled())
        .count();
    let cancellation_rate = if total_orders > 0 {
        total_canceled as f64 / total_orders as f64 * 100.0
    } else {
        0.0
    };

    EmailStats {
        total_emails_scanned,
        total_orders,
        total_canceled,
        cancellation_rate,
    }
}

/// Per-product cancellation counts, highest cancellation rate first.
pub fn product_cancellation_stats(orders: &HashMap<String, Order>) -> Vec<ProductStats> {
    let mut by_name: HashMap<&str, ProductStats> = HashMap::new();

    for order in orders.values() {
        for item in &order.items {
            let stats = by_name
                .entry(item.name.as_str())
                .or_insert_with(|| ProductStats {
                    name: item.name.clone(),
                    image_url: item.image_url.clone(),
                    total_ordered: 0,
                    total_canceled: 0,
                    cancel_rate: 0.0,
                });
            stats.total_ordered += item.quantity;
            if order.status.is_canceled() {
                stats.total_canceled += item.quantity;
            }
        }
    }

    let mut stats: Vec<ProductStats> = by_name
        .into_values()
        .map(|mut stats| {
            if stats.total_ordered > 0 {
                stats.cancel_rate =
                    f64::from(stats.total_canceled) / f64::from(stats.total_ordered) * 100.0;
            }
            stats
        })
        .collect();

    stats.sort_by(|a, b| {
        b.cancel_rate
            .total_cmp(&a.cancel_rate)
            .then_with(|| a.name.cmp(&b.name))
    });
    stats
}

/// Display rows, priced from learned unit prices when known.
pub fn order_lines(orders: &[&Order], learned: &LearnedPrices) -> Vec<OrderLine> {
    orders
        .iter()
        .flat_map(|order| {
            order.items.iter().map(move |item| OrderLine {
                order_id: format_order_id(&order.id),
                order_date: order.order_date.clone(),
                image_url: item.image_url.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                total: match learned.get(&item.name) {
                    Some(price) => format!("${:.2}", price * f64::from(item.quantity)),
                    None => order.total.clone(),
                },
            })
        })
        .collect()
}

pub fn live_order_summary(live: &[&Order], learned: &LearnedPrices) -> LiveOrderSummary {
    let mut units = 0;
    let mut estimated_value = 0.0;

    for order in live {
        units += order.total_quantity();

        let priced: Option<f64> = order
            .items
            .iter()
            .map(|item| learned.get(&item.name).map(|p| p * f64::from(item.quantity)))
            .sum();
        estimated_value += priced
            .or_else(|| parse_amount(&order.total))
            .unwrap_or(0.0);
    }

    LiveOrderSummary {
        orders: live.len(),
        units,
        estimated_value,
    }
}

/// Human readable label for the trailing window ending on `today`.
pub fn date_range_label(days: u32, today: NaiveDate) -> String {
    let start = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(today);
    format!(
        "Email Scan Range: {} to {} ({} days)",
        start.format("%b %-d, %Y"),
        today.format("%b %-d, %Y"),
        days
    )
}

/// Assemble the full report for a finished scan.
pub fn build_report(
    snapshot: &LedgerSnapshot,
    emails_scanned: usize,
    days: u32,
    today: NaiveDate,
) -> ScanReport {
    let non_canceled = filter_non_canceled(&snapshot.orders);
    let learned = learn_prices(&non_canceled);
    let live = filter_live_orders(&non_canceled, &snapshot.shipped);

    let mut orders: Vec<Order> = snapshot.orders.values().cloned().collect();
    orders.sort_by(order_sort);

    ScanReport {
        email_stats: email_stats(&snapshot.orders, emails_scanned),
        live_order_summary: live_order_summary(&live, &learned),
        live_orders: order_lines(&live, &learned),
        product_cancel: product_cancellation_stats(&snapshot.orders),
        order_lines: order_lines(&non_canceled, &learned),
        product_spend: product_summaries(&non_canceled, &learned),
        date_range: date_range_label(days, today),
        shipped: snapshot.shipped.clone(),
        orders,
    }
}
