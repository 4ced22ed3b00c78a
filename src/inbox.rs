//! Inbox synchronization
//!
//! Fetches the most recent messages of a bound mailbox's INBOX. One
//! session per call: open, log in, identify, LIST, SELECT, UID SEARCH,
//! one batched UID FETCH, then LOGOUT on every path.

use crate::config::MailboxCredentials;
use crate::error::{Error, Result};
use crate::message::MailMessage;
use crate::session::{ClientIdentity, INBOX, MailSession, MailTransport};
use tracing::{debug, error, info, warn};

/// Number of messages fetched when the caller does not say otherwise.
pub const DEFAULT_INBOX_LIMIT: usize = 10;

/// Fetch up to `limit` of the most recent INBOX messages.
///
/// The output is in UID order, which usually but not necessarily matches
/// arrival order; sort by [`MailMessage::date`] when recency matters.
/// Messages whose MIME structure cannot be parsed are skipped.
///
/// # Errors
///
/// Returns [`Error::Fetch`] wrapping the underlying cause if connecting,
/// logging in, selecting, searching or fetching fails.
pub async fn fetch_inbox<T: MailTransport>(
    transport: &T,
    credentials: &MailboxCredentials,
    limit: usize,
) -> Result<Vec<MailMessage>> {
    debug!("Connecting to IMAP server: {}", credentials.endpoint());

    let mut session = transport
        .open(&credentials.host, credentials.port)
        .await
        .map_err(|e| fetch_failed(credentials, &e))?;

    let outcome = sync(&mut session, credentials, limit).await;

    debug!("Closing IMAP connection");
    if let Err(e) = session.logout().await {
        error!("Error closing IMAP connection: {}", e);
    }

    let messages = outcome.map_err(|e| fetch_failed(credentials, &e))?;
    info!(
        mailbox = %credentials.address,
        count = messages.len(),
        "Successfully fetched emails"
    );
    Ok(messages)
}

fn fetch_failed(credentials: &MailboxCredentials, cause: &Error) -> Error {
    error!(
        mailbox = %credentials.address,
        endpoint = %credentials.endpoint(),
        error = ?cause,
        "Error fetching emails: {}",
        cause
    );
    Error::Fetch(cause.to_string())
}

async fn sync<S: MailSession>(
    session: &mut S,
    credentials: &MailboxCredentials,
    limit: usize,
) -> Result<Vec<MailMessage>> {
    debug!("Logging in with email: {}", credentials.address);
    session.login(&credentials.address, &credentials.secret).await?;

    let identity = ClientIdentity::for_address(&credentials.address);
    if let Err(e) = session.identify(&identity).await {
        warn!("IMAP ID not accepted, continuing: {}", e);
    }

    let folders = session.list_folders().await?;
    debug!("List folders result: {:?}", folders);
    if !folders.iter().any(|name| name == INBOX) {
        warn!("INBOX not found, trying to select it anyway");
    }

    session.select(INBOX).await?;

    let mut uids = session.search_all().await?;
    uids.sort_unstable();
    let recent = recent_window(&uids, limit);
    debug!("Total messages: {}, fetching {}", uids.len(), recent.len());

    if recent.is_empty() {
        return Ok(Vec::new());
    }

    let raw = session.fetch(recent).await?;
    let messages = raw
        .iter()
        .filter_map(|message| match MailMessage::from_raw(message) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Skipping UID {}: {}", message.uid, e);
                None
            }
        })
        .collect();

    Ok(messages)
}

/// The last `limit` entries of an ascending UID list.
fn recent_window(uids: &[u32], limit: usize) -> &[u32] {
    &uids[uids.len().saturating_sub(limit)..]
}
