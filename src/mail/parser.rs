//! MIME decoding of fetched messages.
//!
//! Uses the `mailparse` crate to read the Subject header and locate the HTML
//! body. Order notifications are multipart; the first `text/html` part found in
//! a depth-first walk is the one the extractors read. Transfer encodings
//! (quoted-printable, base64) are undone by `mailparse`.

use mailparse::{MailHeaderMap, ParsedMail, parse_mail};
use thiserror::Error;

/// The parts of a message the scan cares about.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub subject: String,
    pub html: Option<String>,
}

#[derive(Debug, Error)]
pub enum ParseMessageError {
    #[error("failed to parse MIME structure: {0}")]
    MimeParse(#[from] mailparse::MailParseError),
}

fn sanitize_text(text: &str) -> String {
    text.replace('\0', "").trim().to_string()
}

/// Depth-first search for the first non-empty `text/html` body.
fn find_html_part(part: &ParsedMail<'_>) -> Option<String> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        return match part.get_body() {
            Ok(body) if !body.trim().is_empty() => Some(body),
            Ok(_) => None,
            Err(e) => {
                log::debug!("failed to decode html part: {}", e);
                None
            }
        };
    }

    if part.ctype.mimetype.starts_with("multipart/") {
        return part.subparts.iter().find_map(find_html_part);
    }

    None
}

/// Parse a raw RFC 822 message into its subject and HTML body.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage, ParseMessageError> {
    let parsed = parse_mail(raw).map_err(|e| {
        log::debug!("failed to parse MIME: {}", e);
        ParseMessageError::MimeParse(e)
    })?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| sanitize_text(&s))
        .unwrap_or_default();

    let html = find_html_part(&parsed);

    log::trace!("parsed message: {} (html: {})", subject, html.is_some());

    Ok(ParsedMessage { subject, html })
}
