//! Connection and service configuration
//!
//! Every value can be loaded from the environment (a `.env` file is
//! honoured). Defaults follow the conventional ports: 993 for IMAP over
//! implicit TLS and 587 for SMTP with STARTTLS.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SENDER: &str = "your-crm@example.com";

/// Credentials and endpoint of one IMAP mailbox.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxCredentials {
    pub address: String,
    pub secret: String,
    pub host: String,
    pub port: u16,
}

impl MailboxCredentials {
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        secret: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
            host: host.into(),
            port,
        }
    }

    /// Load mailbox credentials from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `imap.gmail.com`)
    /// - `IMAP_PORT` (default: `993`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or
    /// the port is not a number.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or_else(|_| DEFAULT_IMAP_HOST.to_string()),
            port: env_parse("IMAP_PORT", DEFAULT_IMAP_PORT)?,
            address: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            secret: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
        })
    }

    /// `host:port`, as shown in diagnostics.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Transport-level limits for IMAP sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on every individual IMAP command.
    pub io_timeout: Duration,
    /// Skip certificate verification. Only for self-hosted bridges with
    /// self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            accept_invalid_certs: false,
        }
    }
}

impl ConnectOptions {
    /// Load transport limits from `IMAP_CONNECT_TIMEOUT_SECS`,
    /// `IMAP_IO_TIMEOUT_SECS` and `IMAP_ACCEPT_INVALID_CERTS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is malformed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            connect_timeout: env_secs("IMAP_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            io_timeout: env_secs("IMAP_IO_TIMEOUT_SECS", defaults.io_timeout)?,
            accept_invalid_certs: env_flag("IMAP_ACCEPT_INVALID_CERTS")?,
        })
    }
}

/// SMTP relay configuration for the outbound mailer.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Envelope and `From:` address.
    pub sender: String,
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Load SMTP settings from `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`,
    /// `SMTP_PASSWORD`, `EMAIL_SENDER` and `SMTP_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the port or timeout is malformed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("SMTP_HOST").unwrap_or_else(|_| DEFAULT_SMTP_HOST.to_string()),
            port: env_parse("SMTP_PORT", DEFAULT_SMTP_PORT)?,
            username: env::var("SMTP_USER").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            sender: env::var("EMAIL_SENDER").unwrap_or_else(|_| DEFAULT_SENDER.to_string()),
            timeout: env_secs("SMTP_TIMEOUT_SECS", Duration::from_secs(30))?,
        })
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sender", &self.sender)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Credentials for the Google Trends data source.
#[derive(Clone)]
pub struct TrendConfig {
    pub api_key: String,
}

impl TrendConfig {
    /// Load the SerpAPI key from `SERPAPI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is not set.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: env::var("SERPAPI_API_KEY")
                .map_err(|_| Error::Config("SERPAPI_API_KEY not set".into()))?,
        })
    }
}

impl fmt::Debug for TrendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrendConfig")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env::var(name).map_or(Ok(default), |raw| parse_value(name, &raw))
}

pub(crate) fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}

fn env_flag(name: &str) -> Result<bool> {
    env::var(name).map_or(Ok(false), |raw| parse_flag(name, &raw))
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {name}: {e}")))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("Invalid {name}: {other}"))),
    }
}
