//! Inbox message records
//!
//! Turns a [`RawMessage`] into a [`MailMessage`]: RFC 2047 decoding of
//! the subject and sender, a readable body, and attachment detection.

use crate::error::{Error, Result};
use crate::session::RawMessage;
use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use serde::{Deserialize, Serialize};
use tracing::debug;

const HTML_WRAP_WIDTH: usize = 80;

/// One message from a mailbox, as shown to CRM users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Provider UID, stable within one mailbox.
    pub id: String,
    pub subject: String,
    /// Decoded `From:` header, e.g. `Alice <alice@example.com>`.
    pub from_addr: String,
    /// Server INTERNALDATE (when the message arrived).
    pub date: Option<DateTime<Utc>>,
    pub body: String,
    pub has_attachments: bool,
    pub is_read: bool,
}

impl MailMessage {
    /// Parse a fetched message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the MIME structure cannot be read.
    pub fn from_raw(raw: &RawMessage) -> Result<Self> {
        let parsed = mailparse::parse_mail(&raw.body)
            .map_err(|e| Error::Parse(format!("UID {}: {e}", raw.uid)))?;

        let headers = parsed.get_headers();
        let subject = headers.get_first_value("Subject").unwrap_or_default();
        let from_addr = headers.get_first_value("From").unwrap_or_default();

        Ok(Self {
            id: raw.uid.to_string(),
            subject,
            from_addr,
            date: raw.internal_date.map(|d| d.with_timezone(&Utc)),
            body: body_text(&parsed),
            has_attachments: has_attachments(&parsed),
            is_read: raw.seen,
        })
    }
}

/// True if any leaf part carries a `Content-Disposition` header and a
/// filename.
#[must_use]
pub fn has_attachments(mail: &ParsedMail<'_>) -> bool {
    if mail.ctype.mimetype.starts_with("multipart/") || !mail.subparts.is_empty() {
        return mail.subparts.iter().any(has_attachments);
    }

    if mail.headers.get_first_value("Content-Disposition").is_none() {
        return false;
    }

    let disposition = mail.get_content_disposition();
    disposition.params.contains_key("filename") || mail.ctype.params.contains_key("name")
}

/// Prefer the first `text/plain` part; fall back to rendered HTML.
fn body_text(mail: &ParsedMail<'_>) -> String {
    let mut plain = None;
    let mut html = None;
    collect_text(mail, &mut plain, &mut html);

    plain
        .or_else(|| html.map(|h| html_to_text(&h)))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn collect_text(mail: &ParsedMail<'_>, plain: &mut Option<String>, html: &mut Option<String>) {
    if !mail.subparts.is_empty() {
        for part in &mail.subparts {
            collect_text(part, plain, html);
        }
        return;
    }

    if mail.get_content_disposition().disposition == mailparse::DispositionType::Attachment {
        return;
    }

    let slot = match mail.ctype.mimetype.as_str() {
        "text/plain" => plain,
        "text/html" => html,
        _ => return,
    };
    if slot.is_none() {
        *slot = mail.get_body().ok();
    }
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH).unwrap_or_else(|e| {
        debug!("HTML body could not be rendered: {}", e);
        html.to_string()
    })
}
