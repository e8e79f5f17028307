use chrono::NaiveDate;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tracking value recorded for arrival notices that carry no tracking number.
pub const DELIVERED_TRACKING: &str = "DELIVERED";

/// Carrier label recorded alongside [`DELIVERED_TRACKING`].
pub const DELIVERED_CARRIER: &str = "Delivered";

// ===== Order Models =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Confirmed,
    PreOrdered,
    Canceled,
}

impl OrderStatus {
    pub fn is_canceled(self) -> bool {
        self == OrderStatus::Canceled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub quantity: u32,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

/// One logical purchase, aggregated from every message that references its ID.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Order {
    /// Upstream order number with separators removed.
    pub id: String,
    pub items: Vec<Item>,
    /// Currency string exactly as rendered upstream, e.g. `$20.00`.
    pub total: String,
    #[serde(rename = "orderDate")]
    pub order_date: String,
    #[serde(rename = "orderDateParsed")]
    pub order_date_parsed: Option<NaiveDate>,
    pub status: OrderStatus,
}

impl Order {
    /// Bare cancellation record for an order whose details are not known yet.
    pub fn canceled(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: Vec::new(),
            total: String::new(),
            order_date: String::new(),
            order_date_parsed: None,
            status: OrderStatus::Canceled,
        }
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

/// One tracking event for an order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ShippedOrder {
    pub id: String,
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    pub carrier: String,
    #[serde(rename = "estimatedArrival")]
    pub estimated_arrival: String,
}

impl ShippedOrder {
    /// Synthetic record marking an order as arrived.
    pub fn delivered(order_id: impl Into<String>) -> Self {
        Self {
            id: order_id.into(),
            tracking_number: DELIVERED_TRACKING.to_string(),
            carrier: DELIVERED_CARRIER.to_string(),
            estimated_arrival: String::new(),
        }
    }

    pub fn is_delivered_marker(&self) -> bool {
        self.tracking_number == DELIVERED_TRACKING
    }

    /// Key used to drop duplicate notifications within one scan.
    pub fn dedup_key(&self) -> &str {
        if self.is_delivered_marker() {
            &self.id
        } else {
            &self.tracking_number
        }
    }
}

// ===== Cached Extraction =====

/// Everything one message contributed to the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CachedResult {
    pub order: Option<Order>,
    pub shipped: Vec<ShippedOrder>,
}

impl CachedResult {
    pub fn from_order(order: Order) -> Self {
        Self {
            order: Some(order),
            shipped: Vec::new(),
        }
    }

    pub fn from_shipments(shipped: Vec<ShippedOrder>) -> Self {
        Self {
            order: None,
            shipped,
        }
    }
}
