//! IMAP session abstraction
//!
//! [`MailTransport`] opens sessions and [`MailSession`] exposes the
//! handful of commands the verifier and the inbox synchronizer need.
//! The production pair, [`ImapTransport`] and [`ImapSession`], drives
//! async-imap over implicit TLS; tests substitute an in-memory mock.

use crate::config::ConnectOptions;
use crate::connection::{self, AuthenticatedSession, ImapClient, bounded};
use crate::error::{Error, Result};
use async_imap::types::Flag;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the inbox folder (RFC 3501).
pub const INBOX: &str = "INBOX";

/// FETCH items for inbox sync. `BODY.PEEK[]` leaves `\Seen` untouched.
const FETCH_ITEMS: &str = "(UID FLAGS INTERNALDATE BODY.PEEK[])";

/// One message as returned by the server, before MIME parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: u32,
    pub body: Vec<u8>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub seen: bool,
}

/// Client identification sent with the RFC 2971 `ID` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
    pub vendor: String,
    pub contact: String,
}

impl ClientIdentity {
    /// The identity announced for a mailbox; some providers (163.com)
    /// refuse SELECT until a client has identified itself.
    #[must_use]
    pub fn for_address(address: &str) -> Self {
        Self {
            name: "Merchant IMAP Client".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            vendor: "Merchant".to_string(),
            contact: address.to_string(),
        }
    }

    /// Key/value pairs in wire order.
    #[must_use]
    pub fn fields(&self) -> [(&str, Option<&str>); 4] {
        [
            ("name", Some(self.name.as_str())),
            ("version", Some(self.version.as_str())),
            ("vendor", Some(self.vendor.as_str())),
            ("support-email", Some(self.contact.as_str())),
        ]
    }
}

/// Opens IMAP sessions.
#[async_trait]
pub trait MailTransport: Send + Sync {
    type Session: MailSession;

    /// Connect to `host:port`. The returned session is not logged in.
    async fn open(&self, host: &str, port: u16) -> Result<Self::Session>;
}

/// The IMAP commands used by this crate.
///
/// `logout` must be callable in every state: before login, after a
/// rejected login, and after the connection is gone (a no-op then).
#[async_trait]
pub trait MailSession: Send {
    async fn login(&mut self, address: &str, secret: &str) -> Result<()>;

    async fn identify(&mut self, identity: &ClientIdentity) -> Result<()>;

    async fn list_folders(&mut self) -> Result<Vec<String>>;

    async fn select(&mut self, folder: &str) -> Result<()>;

    /// UIDs of every message in the selected folder, in server order.
    async fn search_all(&mut self) -> Result<Vec<u32>>;

    /// Fetch the given UIDs in a single batched command.
    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>>;

    async fn logout(&mut self) -> Result<()>;
}

/// Opens [`ImapSession`]s over implicit TLS.
#[derive(Debug, Clone, Default)]
pub struct ImapTransport {
    options: ConnectOptions,
}

impl ImapTransport {
    #[must_use]
    pub const fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    /// Build a transport from `IMAP_*` environment settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout or flag variable is malformed.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ConnectOptions::from_env()?))
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    type Session = ImapSession;

    async fn open(&self, host: &str, port: u16) -> Result<ImapSession> {
        let client = connection::connect(host, port, &self.options).await?;
        Ok(ImapSession {
            state: State::Connected(client),
            io_timeout: self.options.io_timeout,
        })
    }
}

enum State {
    Connected(ImapClient),
    Authenticated(AuthenticatedSession),
    Closed,
}

/// A live async-imap connection; every command is bounded by the
/// transport's I/O timeout.
pub struct ImapSession {
    state: State,
    io_timeout: Duration,
}

impl ImapSession {
    fn authenticated(&mut self) -> Result<&mut AuthenticatedSession> {
        match &mut self.state {
            State::Authenticated(session) => Ok(session),
            State::Connected(_) => Err(Error::Imap("Not logged in".into())),
            State::Closed => Err(Error::Imap("Session is closed".into())),
        }
    }
}

/// Map an async-imap error, keeping I/O failures classifiable.
fn imap_error(context: &'static str) -> impl Fn(async_imap::error::Error) -> Error {
    move |e| match e {
        async_imap::error::Error::Io(io) => Error::Io(io),
        other => Error::Imap(format!("{context}: {other}")),
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn login(&mut self, address: &str, secret: &str) -> Result<()> {
        let client = match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected(client) => client,
            other => {
                self.state = other;
                return Err(Error::Imap("Session is not awaiting LOGIN".into()));
            }
        };

        // On timeout the half-open client is dropped; state stays Closed.
        let attempt = tokio::time::timeout(self.io_timeout, client.login(address, secret))
            .await
            .map_err(|_| Error::Timeout {
                operation: "IMAP login",
                after: self.io_timeout,
            })?;

        match attempt {
            Ok(session) => {
                debug!("Logged in as {}", address);
                self.state = State::Authenticated(session);
                Ok(())
            }
            Err((e, client)) => {
                self.state = State::Connected(client);
                match e {
                    async_imap::error::Error::Io(io) => Err(Error::Io(io)),
                    other => Err(Error::Login(other.to_string())),
                }
            }
        }
    }

    async fn identify(&mut self, identity: &ClientIdentity) -> Result<()> {
        let limit = self.io_timeout;
        let session = self.authenticated()?;
        bounded("IMAP ID", limit, async {
            session
                .id(identity.fields())
                .await
                .map_err(imap_error("ID failed"))?;
            Ok(())
        })
        .await
    }

    async fn list_folders(&mut self) -> Result<Vec<String>> {
        let limit = self.io_timeout;
        let session = self.authenticated()?;
        bounded("IMAP LIST", limit, async {
            let mut folder_stream = session
                .list(Some(""), Some("*"))
                .await
                .map_err(imap_error("List folders failed"))?;

            let mut names = Vec::new();
            while let Some(item) = folder_stream.next().await {
                match item {
                    Ok(name) => names.push(name.name().to_string()),
                    Err(e) => warn!("Skipping unreadable LIST entry: {}", e),
                }
            }
            Ok(names)
        })
        .await
    }

    async fn select(&mut self, folder: &str) -> Result<()> {
        let limit = self.io_timeout;
        let session = self.authenticated()?;
        bounded("IMAP SELECT", limit, async {
            session
                .select(folder)
                .await
                .map_err(|e| Error::Imap(format!("Failed to select {folder}: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn search_all(&mut self) -> Result<Vec<u32>> {
        let limit = self.io_timeout;
        let session = self.authenticated()?;
        bounded("IMAP SEARCH", limit, async {
            let uids = session
                .uid_search("ALL")
                .await
                .map_err(imap_error("Search failed"))?;
            Ok(uids.into_iter().collect())
        })
        .await
    }

    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let limit = self.io_timeout;
        let session = self.authenticated()?;
        bounded("IMAP FETCH", limit, async {
            let mut messages = session
                .uid_fetch(&uid_set, FETCH_ITEMS)
                .await
                .map_err(imap_error("Fetch failed"))?;

            let mut raw = Vec::with_capacity(uids.len());
            while let Some(item) = messages.next().await {
                let fetch = item.map_err(imap_error("Fetch error"))?;
                let Some(uid) = fetch.uid else {
                    warn!("FETCH response without UID (seq {})", fetch.message);
                    continue;
                };
                let Some(body) = fetch.body() else {
                    warn!("No body found for UID {}", uid);
                    continue;
                };
                raw.push(RawMessage {
                    uid,
                    body: body.to_vec(),
                    internal_date: fetch.internal_date(),
                    seen: fetch.flags().any(|flag| matches!(flag, Flag::Seen)),
                });
            }
            Ok(raw)
        })
        .await
    }

    async fn logout(&mut self) -> Result<()> {
        let limit = self.io_timeout;
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Authenticated(mut session) => {
                bounded("IMAP logout", limit, async {
                    session.logout().await.map_err(imap_error("Logout failed"))
                })
                .await
            }
            State::Connected(mut client) => {
                bounded("IMAP logout", limit, async {
                    client
                        .run_command_and_check_ok("LOGOUT", None)
                        .await
                        .map_err(imap_error("Logout failed"))
                })
                .await
            }
            State::Closed => Ok(()),
        }
    }
}
