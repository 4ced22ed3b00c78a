//! Error types for merchant-connect

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The server rejected the LOGIN. Carries the server's response text.
    #[error("Login failed: {0}")]
    Login(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scrape error: {0}")]
    Scrape(String),

    /// The trends data source answered with an error payload.
    #[error("Trend source error: {0}")]
    Trend(String),

    /// A mailbox bind was refused because verification failed.
    #[error("{0}")]
    Verification(String),

    #[error("Failed to fetch emails: {0}")]
    Fetch(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

pub type Result<T> = std::result::Result<T, Error>;
