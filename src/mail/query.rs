use crate::config::WindowConfig;

/// Subject fragments of every message kind the scan understands.
const SUBJECT_TERMS: &[&str] = &[
    "thanks for your preorder",
    "thanks for your order",
    "Canceled: delivery from order",
    "was canceled",
    "Shipped:",
    "Arrived:",
    "Delivered:",
];

/// Trailing number of days a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    days: u32,
}

impl ScanWindow {
    /// Clamp a requested window: missing or zero falls back to the default,
    /// anything above the maximum is capped.
    pub fn from_request(days: Option<u32>, config: &WindowConfig) -> Self {
        let days = match days {
            None | Some(0) => config.default_days,
            Some(days) => days.min(config.max_days),
        };
        Self { days }
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Upstream search query covering `days` trailing days of mail from `sender`.
    pub fn query(&self, sender: &str) -> String {
        let subjects = SUBJECT_TERMS
            .iter()
            .map(|term| format!("\"{term}\""))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("from:{sender} subject:({subjects}) newer_than:{}d", self.days)
    }
}
