#![allow(dead_code)]

use async_trait::async_trait;
use order_checker::mail::{
    AuthError, MailClient, MailClientProvider, MailError, MessagePage, RawMessage,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted in-memory mailbox.
#[derive(Default)]
pub struct FakeMailbox {
    messages: Vec<(String, Vec<u8>)>,
    page_size: usize,
    transient_failures: Mutex<HashMap<String, u32>>,
    permanent_failures: HashSet<String>,
    hanging: HashSet<String>,
    listing_fails: bool,
    fetch_delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self {
            page_size: 10,
            ..Default::default()
        }
    }

    pub fn with_message(mut self, id: &str, raw: Vec<u8>) -> Self {
        self.messages.push((id.to_string(), raw));
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fail the next `times` fetches of `id` with a rate-limit error.
    pub fn failing_transiently(self, id: &str, times: u32) -> Self {
        self.transient_failures.lock().insert(id.to_string(), times);
        self
    }

    pub fn failing_permanently(mut self, id: &str) -> Self {
        self.permanent_failures.insert(id.to_string());
        self
    }

    /// Never answer fetches of `id`.
    pub fn hanging_on(mut self, id: &str) -> Self {
        self.hanging.insert(id.to_string());
        self
    }

    /// Answer every fetch only after `delay`.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailClient for FakeMailbox {
    async fn list_messages(
        &self,
        _user: &str,
        _query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailError> {
        if self.listing_fails {
            return Err(MailError::Unauthorized("token expired".into()));
        }

        let start = page_token
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + self.page_size).min(self.messages.len());
        let ids = self.messages[start..end]
            .iter()
            .map(|(id, _)| id.clone())
            .collect();

        Ok(MessagePage {
            ids,
            next_page_token: (end < self.messages.len()).then(|| end.to_string()),
        })
    }

    async fn get_message(&self, _user: &str, id: &str) -> Result<RawMessage, MailError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        if self.hanging.contains(id) {
            std::future::pending::<()>().await;
        }
        if self.permanent_failures.contains(id) {
            return Err(MailError::NotFound(id.to_string()));
        }
        {
            let mut failures = self.transient_failures.lock();
            if let Some(remaining) = failures.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(MailError::RateLimited("rateLimitExceeded".into()));
                }
            }
        }

        self.messages
            .iter()
            .find(|(message_id, _)| message_id == id)
            .map(|(message_id, raw)| RawMessage {
                id: message_id.clone(),
                raw: raw.clone(),
            })
            .ok_or_else(|| MailError::NotFound(id.to_string()))
    }
}

/// Provider handing out one fixed client.
pub struct FixedProvider(pub Arc<dyn MailClient>);

#[async_trait]
impl MailClientProvider for FixedProvider {
    async fn mail_client(&self, _user: &str) -> Result<Arc<dyn MailClient>, AuthError> {
        Ok(self.0.clone())
    }
}

pub fn raw_message(subject: &str, html: Option<&str>) -> Vec<u8> {
    match html {
        Some(html) => format!(
            "Subject: {subject}\r\nFrom: Walmart <help@walmart.com>\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=utf-8\r\n\r\n{html}\r\n"
        ),
        None => format!(
            "Subject: {subject}\r\nFrom: Walmart <help@walmart.com>\r\n\
             Content-Type: text/plain\r\n\r\nYour order was updated.\r\n"
        ),
    }
    .into_bytes()
}

/// Order confirmation body in the upstream template layout.
pub fn confirmation_html(order_number: &str, items: &[(&str, u32)], total: &str) -> String {
    let images: String = items
        .iter()
        .map(|(name, quantity)| {
            format!(
                r#"<img alt="quantity {quantity} item {name}" src="https://i5.walmartimages.com/{name}.jpg">"#
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <a aria-label="Order number {order_number}" href="https://www.walmart.com/orders">{order_number}</a>
        <div><div>Order date: Mon, Jan 2, 2006</div></div>
        {images}
        <div>
          <div><strong>Includes all fees, taxes, discounts and driver tip</strong></div>
          <div><strong>{total}</strong></div>
        </div>
        </body></html>"#
    )
}

pub fn confirmation(order_number: &str, items: &[(&str, u32)], total: &str) -> Vec<u8> {
    raw_message(
        "thanks for your order",
        Some(&confirmation_html(order_number, items, total)),
    )
}

pub fn cancellation(order_number: &str) -> Vec<u8> {
    raw_message(
        &format!("Canceled: delivery from order #{order_number}"),
        None,
    )
}

pub fn shipment(order_number: &str, tracking: &str) -> Vec<u8> {
    let html = format!(
        r#"<html><body>
        <a aria-label="Order number {order_number}" href="https://www.walmart.com/orders">{order_number}</a>
        <span>FedEx tracking number <a href="https://www.fedex.com/track">{tracking}</a></span>
        <strong>Arrives Tue, Jan 3</strong>
        </body></html>"#
    );
    raw_message("Shipped: 1 item", Some(&html))
}

pub fn arrival(order_number: &str) -> Vec<u8> {
    let html = format!(
        r##"<html><body><a href="https://www.walmart.com/orders">#{order_number}</a></body></html>"##
    );
    raw_message("Arrived: your package", Some(&html))
}

/// Canonical ledger key for an upstream order number.
pub fn order_id(order_number: &str) -> String {
    order_number.replace('-', "")
}
