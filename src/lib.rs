//! Mail and prospect-research integrations for the Merchant CRM
//!
//! - verify an IMAP mailbox before binding it to a user, with
//!   remediation text for common provider rejections
//! - fetch the most recent INBOX messages of a bound mailbox
//! - send HTML mail with CC, BCC and attachments over SMTP
//! - estimate a website's monthly traffic and look up search trends,
//!   also exposed as agent tools
//!
//! IMAP runs over implicit TLS (port 993) via `async-imap`; every
//! operation opens and closes its own session.

mod binding;
mod config;
mod connection;
mod error;
mod inbox;
mod mailer;
mod message;
mod session;
mod tools;
mod traffic;
mod trend;
mod verify;


pub use binding::{BindRequest, BindingInfo, MailboxBinding, bind_mailbox};
pub use config::{
    ConnectOptions, DEFAULT_IMAP_HOST, DEFAULT_IMAP_PORT, MailboxCredentials, SmtpConfig,
    TrendConfig,
};
pub use error::{Error, Result};
pub use inbox::{DEFAULT_INBOX_LIMIT, fetch_inbox};
pub use mailer::{
    Attachment, MailRelay, Mailer, OutboundEmail, RelayResponse, SendReceipt, SmtpRelay,
};
pub use message::MailMessage;
pub use session::{
    ClientIdentity, ImapSession, ImapTransport, MailSession, MailTransport, RawMessage,
};
pub use tools::{AgentTool, GoogleTrendTool, WebsiteTrafficTool};
pub use traffic::{
    HttpRenderer, PageRenderer, Readiness, RenderedPage, TrafficEstimate, TrafficEstimator,
    TrafficTier, parse_traffic,
};
pub use trend::{
    SerpApiTrends, TrendData, TrendLookup, TrendOutcome, TrendPoint, TrendReport, TrendSource,
};
pub use verify::{ConnectionCheck, FailureKind, verify_connection};
