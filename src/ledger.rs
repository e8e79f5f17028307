//! In-memory order ledger built during one scan.
//!
//! Workers merge partial results in arbitrary order. [`merge_order`] keeps the
//! outcome independent of that order for the fields that matter: cancellation
//! is terminal and scalar fields keep the first non-empty value seen.

use crate::models::{CachedResult, Order, ShippedOrder};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Fold `delta` into `existing`, returning the merged record.
pub fn merge_order(mut existing: Order, delta: Order) -> Order {
    if existing.items.is_empty() && !delta.items.is_empty() {
        existing.items = delta.items;
    }
    if !existing.status.is_canceled() {
        existing.status = delta.status;
    }
    if existing.total.is_empty() {
        existing.total = delta.total;
    }
    if existing.order_date.is_empty() {
        existing.order_date = delta.order_date;
    }
    if existing.order_date_parsed.is_none() {
        existing.order_date_parsed = delta.order_date_parsed;
    }
    existing
}

#[derive(Default)]
struct LedgerState {
    orders: HashMap<String, Order>,
    shipped: Vec<ShippedOrder>,
    shipped_keys: HashSet<String>,
}

/// Read-only copy of the ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub orders: HashMap<String, Order>,
    pub shipped: Vec<ShippedOrder>,
}

#[derive(Default)]
pub struct OrderLedger {
    inner: Mutex<LedgerState>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, delta: Order) {
        let mut state = self.inner.lock();
        let merged = match state.orders.remove(&delta.id) {
            Some(existing) => merge_order(existing, delta),
            None => delta,
        };
        state.orders.insert(merged.id.clone(), merged);
    }

    /// Record a shipment; returns `false` when it duplicates an earlier one.
    pub fn record_shipment(&self, shipment: ShippedOrder) -> bool {
        let mut state = self.inner.lock();
        if !state.shipped_keys.insert(shipment.dedup_key().to_string()) {
            return false;
        }
        state.shipped.push(shipment);
        true
    }

    /// Apply everything one message contributed.
    pub fn apply(&self, result: CachedResult) {
        if let Some(order) = result.order {
            self.merge(order);
        }
        for shipment in result.shipped {
            if !self.record_shipment(shipment) {
                log::debug!("dropped duplicate shipment notice");
            }
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.inner.lock();
        LedgerSnapshot {
            orders: state.orders.clone(),
            shipped: state.shipped.clone(),
        }
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().orders.len()
    }

    pub fn shipment_count(&self) -> usize {
        self.inner.lock().shipped.len()
    }
}
