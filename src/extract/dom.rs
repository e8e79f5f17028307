//! Structural queries over notification HTML.
//!
//! Every function here is tolerant of template drift: a missing element
//! produces an empty value instead of an error.

use crate::models::Item;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

const FEES_DISCLAIMER: &str = "Includes all fees, taxes, discounts and driver tip";
const ORDER_DATE_LABEL: &str = "Order date:";
const TRACKING_LABEL: &str = "tracking number";
const ARRIVAL_LABEL: &str = "Arrives";
const THUMBNAIL_PROXY: &str = "https://images.weserv.nl/?url=";
const THUMBNAIL_OPTIONS: &str = "&trim=10&bg=00000000";
const ORDER_DATE_FORMATS: &[&str] = &["%a, %b %d, %Y", "%A, %B %d, %Y"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

static LABELED_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[aria-label]"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static ITEM_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("img[alt*='quantity']"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));
static DIV: LazyLock<Selector> = LazyLock::new(|| selector("div"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));

static ORDER_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Order date:\s*([^\n]*)").expect("static regex must compile"));
static CARRIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s+tracking\s+number").expect("static regex must compile"));

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Canonical order ID: separators and a leading `#` removed.
pub fn normalize_order_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Upstream order numbers run to fifteen digits; short digit runs in labels
/// are ratings or counts.
const MIN_ORDER_DIGITS: usize = 10;

fn is_order_number(token: &str) -> bool {
    let normalized = normalize_order_id(token);
    normalized.len() >= MIN_ORDER_DIGITS && normalized.chars().all(|c| c.is_ascii_digit())
}

/// Order number from the first labeled link that carries one, either as its
/// text or as a token of its accessible label.
pub fn order_number(doc: &Html) -> Option<String> {
    doc.select(&LABELED_ANCHOR).find_map(|anchor| {
        let label = anchor.value().attr("aria-label")?;
        if !label.contains(' ') {
            return None;
        }

        let text = text_of(&anchor);
        if is_order_number(&text) {
            return Some(normalize_order_id(&text));
        }
        label
            .split_whitespace()
            .find(|token| is_order_number(token))
            .map(normalize_order_id)
    })
}

/// Order number on arrival notices, rendered as link text like `#2000129-05242992`.
pub fn delivered_order_number(doc: &Html) -> Option<String> {
    doc.select(&ANCHOR)
        .map(|a| text_of(&a).trim().to_string())
        .filter(|text| {
            text.starts_with('#')
                && text.contains('-')
                && text.len() > 10
                && text.chars().nth(1) == Some('2')
        })
        .last()
        .map(|text| normalize_order_id(&text))
}

fn thumbnail_url(src: &str) -> String {
    if src.is_empty() {
        return String::new();
    }
    format!("{THUMBNAIL_PROXY}{src}{THUMBNAIL_OPTIONS}")
}

/// Parse an image alt text of the form `quantity <qty> item <name>`.
fn parse_item_alt(alt: &str, src: &str) -> Option<Item> {
    let parts: Vec<&str> = alt.split(" item ").collect();
    if parts.len() != 2 {
        return None;
    }
    let name = parts[1].trim();
    if name.is_empty() {
        return None;
    }
    let quantity = parts[0]
        .split(' ')
        .nth(1)
        .and_then(|q| q.trim().parse::<u32>().ok())
        .filter(|q| *q > 0)
        .unwrap_or(1);

    Some(Item {
        name: name.to_string(),
        quantity,
        image_url: thumbnail_url(src),
    })
}

pub fn items(doc: &Html) -> Vec<Item> {
    doc.select(&ITEM_IMAGE)
        .filter_map(|img| {
            let alt = img.value().attr("alt").unwrap_or_default();
            let src = img.value().attr("src").unwrap_or_default();
            parse_item_alt(alt, src)
        })
        .collect()
}

/// Order total, read from the block following the fee disclaimer.
pub fn total(doc: &Html) -> String {
    let Some(disclaimer) = doc
        .select(&STRONG)
        .find(|s| text_of(s).contains(FEES_DISCLAIMER))
    else {
        return String::new();
    };

    let Some(parent) = disclaimer.parent().and_then(ElementRef::wrap) else {
        return String::new();
    };

    parent
        .next_siblings()
        .find_map(ElementRef::wrap)
        .map(|block| {
            block
                .select(&STRONG)
                .map(|s| text_of(&s))
                .collect::<String>()
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

fn parse_order_date(raw: &str) -> Option<NaiveDate> {
    ORDER_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Raw order date string and its parsed form, when the format is recognised.
pub fn order_date(doc: &Html) -> (String, Option<NaiveDate>) {
    // The innermost labelled block holds the least surrounding text.
    let Some(block) = doc
        .select(&DIV)
        .map(|div| text_of(&div))
        .filter(|text| text.contains(ORDER_DATE_LABEL))
        .min_by_key(|text| text.len())
    else {
        return (String::new(), None);
    };

    let Some(raw) = ORDER_DATE_RE
        .captures(&block)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
    else {
        return (String::new(), None);
    };

    let parsed = parse_order_date(&raw);
    if parsed.is_none() && !raw.is_empty() {
        log::debug!("unrecognised order date format: {}", raw);
    }
    (raw, parsed)
}

fn tracking_spans<'a>(doc: &'a Html) -> impl Iterator<Item = ElementRef<'a>> {
    doc.select(&SPAN)
        .filter(|span| text_of(span).contains(TRACKING_LABEL))
}

/// Tracking numbers, in document order, from links inside tracking blocks.
pub fn tracking_numbers(doc: &Html) -> Vec<String> {
    doc.select(&ANCHOR)
        .filter(|a| {
            a.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| el.value().name() == "span" && text_of(&el).contains(TRACKING_LABEL))
        })
        .map(|a| text_of(&a).trim().to_string())
        .collect()
}

pub fn arrival_dates(doc: &Html) -> Vec<String> {
    doc.select(&STRONG)
        .map(|s| text_of(&s))
        .filter(|text| text.contains(ARRIVAL_LABEL))
        .map(|text| text.trim().to_string())
        .collect()
}

pub fn carrier(doc: &Html) -> String {
    let text: String = tracking_spans(doc).map(|span| text_of(&span)).collect();
    CARRIER_RE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
