//! IMAP connection verification
//!
//! A one-shot check used before a mailbox is bound: open, log in,
//! identify, log out. Every failure is turned into a [`ConnectionCheck`]
//! whose message tells the user what to change.

use crate::config::MailboxCredentials;
use crate::error::{Error, Result};
use crate::session::{ClientIdentity, MailSession, MailTransport};
use serde::{Deserialize, Serialize};
use std::io;
use tracing::{debug, info, warn};

pub const SUCCESS_MESSAGE: &str = "Connection successful";

const GMAIL_APP_PASSWORD: &str = "Gmail requires an app password. Open Google Account -> \
Security -> 2-Step Verification -> App passwords, generate an app password and use it \
instead of your Gmail password.";

const NETEASE_AUTH_CODE: &str = "163 Mail login failed. Make sure the password is correct. \
If client authorization codes are enabled (Settings -> POP3/SMTP/IMAP -> enable IMAP -> \
generate authorization code), use the authorization code instead of your login password.";

/// Broad cause of a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider requires an app password or authorization code.
    ProviderPolicy,
    Credentials,
    Refused,
    TimedOut,
    /// Network or DNS failure.
    Unreachable,
    Other,
}

/// Outcome of [`verify_connection`]. `message` is always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ConnectionCheck {
    fn ok() -> Self {
        Self {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            failure: None,
        }
    }

    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            failure: Some(kind),
        }
    }

    /// The `(ok, message)` pair shown to users.
    #[must_use]
    pub fn as_pair(&self) -> (bool, &str) {
        (self.success, &self.message)
    }
}

/// A provider whose login rejections map to a known remediation.
struct PolicyRule {
    applies: fn(&MailboxCredentials) -> bool,
    signatures: &'static [&'static str],
    remediation: &'static str,
}

fn is_gmail(credentials: &MailboxCredentials) -> bool {
    credentials.host.to_ascii_lowercase().contains("gmail.com")
}

fn is_netease(credentials: &MailboxCredentials) -> bool {
    credentials.address.to_ascii_lowercase().contains("163.com")
        || credentials.host.to_ascii_lowercase().contains("163.com")
}

/// Checked in order; first match wins.
const POLICY_RULES: &[PolicyRule] = &[
    PolicyRule {
        applies: is_gmail,
        signatures: &["Unsafe Login", "Application-specific password"],
        remediation: GMAIL_APP_PASSWORD,
    },
    PolicyRule {
        applies: is_netease,
        signatures: &["AUTHENTICATE failed", "Invalid credentials"],
        remediation: NETEASE_AUTH_CODE,
    },
];

/// Check a mailbox: open, log in, identify, log out.
///
/// Never fails; problems are reported through the returned check. When a
/// session was opened it is logged out exactly once, including after a
/// rejected login.
pub async fn verify_connection<T: MailTransport>(
    transport: &T,
    credentials: &MailboxCredentials,
) -> ConnectionCheck {
    debug!("Verifying IMAP connection to {}", credentials.endpoint());

    let mut session = match transport.open(&credentials.host, credentials.port).await {
        Ok(session) => session,
        Err(e) => return classify(credentials, &e),
    };

    let outcome = sign_in(&mut session, credentials).await;

    if let Err(e) = session.logout().await {
        debug!("Logout after verification failed: {}", e);
    }

    match outcome {
        Ok(()) => {
            info!(mailbox = %credentials.address, "IMAP connection verified");
            ConnectionCheck::ok()
        }
        Err(e) => classify(credentials, &e),
    }
}

async fn sign_in<S: MailSession>(
    session: &mut S,
    credentials: &MailboxCredentials,
) -> Result<()> {
    session.login(&credentials.address, &credentials.secret).await?;

    let identity = ClientIdentity::for_address(&credentials.address);
    if let Err(e) = session.identify(&identity).await {
        warn!("IMAP ID not accepted: {}", e);
    } else {
        debug!("Sent IMAP ID info: {:?}", identity);
    }
    Ok(())
}

fn classify(credentials: &MailboxCredentials, err: &Error) -> ConnectionCheck {
    let check = if let Error::Login(text) = err {
        classify_login(credentials, text)
    } else if let Some(kind) = network_failure(err) {
        ConnectionCheck::failed(kind, network_message(kind, &credentials.endpoint()))
    } else {
        ConnectionCheck::failed(FailureKind::Other, format!("Connection error: {err}"))
    };

    warn!(
        mailbox = %credentials.address,
        endpoint = %credentials.endpoint(),
        kind = ?check.failure,
        error = %err,
        "IMAP verification failed"
    );
    check
}

fn classify_login(credentials: &MailboxCredentials, text: &str) -> ConnectionCheck {
    POLICY_RULES
        .iter()
        .find(|rule| {
            (rule.applies)(credentials) && rule.signatures.iter().any(|sig| text.contains(sig))
        })
        .map_or_else(
            || ConnectionCheck::failed(FailureKind::Credentials, format!("IMAP error: {text}")),
            |rule| ConnectionCheck::failed(FailureKind::ProviderPolicy, rule.remediation),
        )
}

/// Classify transport failures by error value rather than message text.
fn network_failure(err: &Error) -> Option<FailureKind> {
    match err {
        Error::Timeout { .. } => Some(FailureKind::TimedOut),
        Error::Io(io) => io_failure(io),
        _ => None,
    }
}

fn io_failure(err: &io::Error) -> Option<FailureKind> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => return Some(FailureKind::Refused),
        io::ErrorKind::TimedOut => return Some(FailureKind::TimedOut),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
            return Some(FailureKind::Unreachable);
        }
        _ => {}
    }

    match err.raw_os_error() {
        Some(111) => Some(FailureKind::Refused),
        Some(110) => Some(FailureKind::TimedOut),
        Some(101 | 113) => Some(FailureKind::Unreachable),
        _ if is_lookup_failure(err) => Some(FailureKind::Unreachable),
        _ => None,
    }
}

/// Resolver failures carry no dedicated error kind.
fn is_lookup_failure(err: &io::Error) -> bool {
    let text = err.to_string();
    [
        "failed to lookup address",
        "Name or service not known",
        "nodename nor servname",
        "No such host",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}

fn network_message(kind: FailureKind, endpoint: &str) -> String {
    match kind {
        FailureKind::Refused => format!(
            "IMAP server {endpoint} refused the connection. Check that the server is running \
             and that the port is correct."
        ),
        FailureKind::TimedOut => format!(
            "Connecting to IMAP server {endpoint} timed out. Check your network connection \
             and the server status."
        ),
        _ => format!(
            "Cannot reach IMAP server {endpoint}. Please check:\n\
             1. Network connectivity\n\
             2. The server address is correct\n\
             3. Firewall settings allow the connection\n\
             4. DNS resolution is working"
        ),
    }
}
