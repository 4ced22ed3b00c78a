//! Outbound mail
//!
//! [`Mailer`] composes HTML messages with optional CC, BCC and
//! attachments and hands them to a [`MailRelay`]. [`SmtpRelay`] delivers
//! over authenticated SMTP with lettre, opening one connection per send.

use crate::config::SmtpConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

/// SMTP reply codes treated as delivered.
pub const ACCEPTED_CODES: [u16; 2] = [250, 200];

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Port on which SMTP uses implicit TLS instead of STARTTLS.
const SMTPS_PORT: u16 = 465;

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A file attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub data: Vec<u8>,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl Attachment {
    /// An attachment typed `application/octet-stream`.
    #[must_use]
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: default_content_type(),
            data,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// An HTML message to send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl OutboundEmail {
    #[must_use]
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            ..Self::default()
        }
    }
}

/// Confirmation of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub status: String,
    pub message_id: String,
    pub to: String,
    pub subject: String,
}

/// Final reply of the relay for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub code: u16,
    pub message: String,
}

/// Delivers composed messages.
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<RelayResponse>;
}

/// SMTP delivery through lettre.
///
/// Uses STARTTLS, or implicit TLS when the port is 465. Credentials are
/// only sent when both user and password are configured.
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    config: SmtpConfig,
}

impl SmtpRelay {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = &self.config.host;
        let builder = if self.config.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| Error::Send(format!("SMTP relay error: {e}")))?;

        let mut builder = builder
            .port(self.config.port)
            .timeout(Some(self.config.timeout));

        if let (Some(user), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn deliver(&self, message: Message) -> Result<RelayResponse> {
        debug!("Delivering via {}:{}", self.config.host, self.config.port);
        let response = self
            .transport()?
            .send(message)
            .await
            .map_err(|e| Error::Send(e.to_string()))?;

        let code = response
            .code()
            .to_string()
            .parse()
            .map_err(|e| Error::Send(format!("Unreadable SMTP reply code: {e}")))?;

        Ok(RelayResponse {
            code,
            message: response.message().collect::<Vec<_>>().join(" "),
        })
    }
}

/// Composes and sends HTML mail from a fixed sender.
pub struct Mailer<R> {
    relay: R,
    sender: String,
}

impl Mailer<SmtpRelay> {
    /// Mailer over SMTP configured from `SMTP_*` and `EMAIL_SENDER`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed numeric settings.
    pub fn from_env() -> Result<Self> {
        let config = SmtpConfig::from_env()?;
        let sender = config.sender.clone();
        Ok(Self::new(SmtpRelay::new(config), sender))
    }
}

impl<R: MailRelay> Mailer<R> {
    #[must_use]
    pub fn new(relay: R, sender: impl Into<String>) -> Self {
        Self {
            relay,
            sender: sender.into(),
        }
    }

    /// Send `email`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Send`] if an address or attachment type is
    /// invalid, delivery fails, or the relay answers with a code other
    /// than 250 or 200.
    pub async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let message_id = self.next_message_id();
        let message = self.compose(email, &message_id)?;

        let response = self.relay.deliver(message).await.map_err(|e| {
            error!(to = %email.to, "Error sending email: {}", e);
            if matches!(e, Error::Send(_)) {
                e
            } else {
                Error::Send(e.to_string())
            }
        })?;

        if !ACCEPTED_CODES.contains(&response.code) {
            error!(to = %email.to, code = response.code, "Relay rejected message");
            return Err(Error::Send(format!("{} {}", response.code, response.message)));
        }

        info!(to = %email.to, subject = %email.subject, %message_id, "Email sent");
        Ok(SendReceipt {
            status: "success".to_string(),
            message_id,
            to: email.to.clone(),
            subject: email.subject.clone(),
        })
    }

    /// Send the standard reply to a customer inquiry.
    ///
    /// `content` is inserted as HTML; the customer name is escaped.
    ///
    /// # Errors
    ///
    /// See [`Mailer::send`].
    pub async fn send_customer_engagement(
        &self,
        to: &str,
        customer_name: &str,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<SendReceipt> {
        let email = OutboundEmail {
            attachments,
            ..OutboundEmail::new(
                to,
                format!("Regarding your business inquiry - {customer_name}"),
                engagement_html(customer_name, content),
            )
        };
        self.send(&email).await
    }

    fn next_message_id(&self) -> String {
        let domain = self
            .sender
            .rsplit_once('@')
            .map_or("localhost", |(_, domain)| domain.trim_end_matches('>'));
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("<{nanos:x}.{seq}@{domain}>")
    }

    fn compose(&self, email: &OutboundEmail, message_id: &str) -> Result<Message> {
        let mut builder = Message::builder()
            .from(mailbox(&self.sender)?)
            .to(mailbox(&email.to)?)
            .subject(&email.subject)
            .message_id(Some(message_id.to_string()));

        for cc in &email.cc {
            builder = builder.cc(mailbox(cc)?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(mailbox(bcc)?);
        }

        let html = SinglePart::html(email.html_body.clone());
        let message = if email.attachments.is_empty() {
            builder.singlepart(html)
        } else {
            let mut parts = MultiPart::mixed().singlepart(html);
            for attachment in &email.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    Error::Send(format!(
                        "Invalid content type {:?} for {}: {e}",
                        attachment.content_type, attachment.filename
                    ))
                })?;
                parts = parts.singlepart(
                    lettre::message::Attachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder.multipart(parts)
        };

        message.map_err(|e| Error::Send(format!("Failed to build message: {e}")))
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| Error::Send(format!("Invalid address {address:?}: {e}")))
}

fn engagement_html(customer_name: &str, content: &str) -> String {
    let name = escape_html(customer_name);
    format!(
        "<html>\n\
         <body>\n\
         <p>Dear {name},</p>\n\
         <div>{content}</div>\n\
         <p><br>Best regards,<br>Your account manager</p>\n\
         </body>\n\
         </html>\n"
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
