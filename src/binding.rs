//! Verified mailbox bindings
//!
//! A [`MailboxBinding`] ties a CRM user to one IMAP mailbox. Bindings are
//! only ever created through [`bind_mailbox`], which verifies the mailbox
//! first; storing and deleting them is the caller's job.

use crate::config::{DEFAULT_IMAP_HOST, DEFAULT_IMAP_PORT, MailboxCredentials};
use crate::error::{Error, Result};
use crate::inbox::fetch_inbox;
use crate::message::MailMessage;
use crate::session::MailTransport;
use crate::verify::verify_connection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A bind request as submitted by a user.
#[derive(Debug, Clone, Deserialize)]
pub struct BindRequest {
    #[serde(rename = "email")]
    pub address: String,
    #[serde(rename = "password")]
    pub secret: String,
    #[serde(rename = "imap_server", default = "default_host")]
    pub host: String,
    #[serde(rename = "imap_port", default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    DEFAULT_IMAP_HOST.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_IMAP_PORT
}

impl BindRequest {
    /// A request for the default Gmail endpoint.
    #[must_use]
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
            host: default_host(),
            port: default_port(),
        }
    }

    #[must_use]
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    fn credentials(&self) -> MailboxCredentials {
        MailboxCredentials::new(&self.address, &self.secret, &self.host, self.port)
    }
}

/// A user's verified mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxBinding {
    /// Storage identifier, assigned once the binding is persisted.
    pub id: Option<i64>,
    pub user_id: i64,
    pub credentials: MailboxCredentials,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MailboxBinding {
    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// The view returned to API clients; never includes the secret.
    #[must_use]
    pub fn info(&self) -> BindingInfo {
        BindingInfo {
            id: self.id,
            email: self.credentials.address.clone(),
            imap_server: self.credentials.host.clone(),
            imap_port: self.credentials.port,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: Some(self.updated_at),
        }
    }

    /// Fetch the most recent INBOX messages of this mailbox.
    ///
    /// # Errors
    ///
    /// See [`fetch_inbox`].
    pub async fn fetch_inbox<T: MailTransport>(
        &self,
        transport: &T,
        limit: usize,
    ) -> Result<Vec<MailMessage>> {
        fetch_inbox(transport, &self.credentials, limit).await
    }
}

/// Public, secret-free view of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingInfo {
    pub id: Option<i64>,
    pub email: String,
    pub imap_server: String,
    pub imap_port: u16,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Verify the mailbox in `request` and, on success, bind it to `user_id`.
///
/// # Errors
///
/// Returns [`Error::Verification`] carrying the verifier's message when
/// the address is malformed or the mailbox cannot be reached or logged
/// into.
pub async fn bind_mailbox<T: MailTransport>(
    transport: &T,
    user_id: i64,
    request: &BindRequest,
) -> Result<MailboxBinding> {
    if !looks_like_address(&request.address) {
        return Err(Error::Verification(format!(
            "Invalid email address: {}",
            request.address
        )));
    }

    let credentials = request.credentials();
    let check = verify_connection(transport, &credentials).await;
    if !check.success {
        return Err(Error::Verification(check.message));
    }

    let now = Utc::now();
    info!(user_id, mailbox = %credentials.address, "Mailbox bound");
    Ok(MailboxBinding {
        id: None,
        user_id,
        credentials,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

fn looks_like_address(address: &str) -> bool {
    address.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
    })
}
