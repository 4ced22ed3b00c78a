//! Test data model for the fake IMAP server
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .folder("INBOX")
//!         .email(1, false, raw_rfc2822_bytes)
//!         .email_at(2, true, raw_rfc2822_bytes, "15-Mar-2024 08:30:00 +0100")
//!     .unlisted_folder("Archive")
//!     .reject_login("[ALERT] Application-specific password required")
//!     .build();
//! ```
//!
//! Unlisted folders are hidden from LIST but can still be selected,
//! like providers that omit INBOX from their folder listing.

/// INTERNALDATE used when a test does not pick one.
pub const DEFAULT_INTERNAL_DATE: &str = "01-Jan-2024 12:00:00 +0000";

/// Mailbox state shared with the server.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    pub folders: Vec<Folder>,
    /// When set, LOGIN is answered with `NO <text>`.
    pub reject_login: Option<String>,
}

impl Mailbox {
    /// Look up a folder by name (case-sensitive).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    /// Folders that appear in LIST responses.
    pub fn listed_folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.iter().filter(|f| f.listed)
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub listed: bool,
    pub emails: Vec<TestEmail>,
}

/// A stored message.
///
/// `internal_date` uses the IMAP date-time format
/// (`dd-Mon-yyyy hh:mm:ss +zzzz`) and is returned verbatim in FETCH.
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub seen: bool,
    pub internal_date: String,
    pub raw: Vec<u8>,
}

pub struct MailboxBuilder {
    mailbox: Mailbox,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            mailbox: Mailbox::default(),
        }
    }

    /// Add a listed folder. Subsequent `.email()` calls add to it.
    pub fn folder(self, name: &str) -> Self {
        self.push_folder(name, true)
    }

    /// Add a folder that LIST does not report.
    pub fn unlisted_folder(self, name: &str) -> Self {
        self.push_folder(name, false)
    }

    fn push_folder(mut self, name: &str, listed: bool) -> Self {
        self.mailbox.folders.push(Folder {
            name: name.to_string(),
            listed,
            emails: Vec::new(),
        });
        self
    }

    /// Add an email with the default INTERNALDATE.
    pub fn email(self, uid: u32, seen: bool, raw: &[u8]) -> Self {
        self.email_at(uid, seen, raw, DEFAULT_INTERNAL_DATE)
    }

    /// Add an email to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any folder was added.
    pub fn email_at(mut self, uid: u32, seen: bool, raw: &[u8], internal_date: &str) -> Self {
        self.mailbox
            .folders
            .last_mut()
            .expect("add a folder before adding emails")
            .emails
            .push(TestEmail {
                uid,
                seen,
                internal_date: internal_date.to_string(),
                raw: raw.to_vec(),
            });
        self
    }

    /// Answer every LOGIN with `NO <text>`.
    pub fn reject_login(mut self, text: &str) -> Self {
        self.mailbox.reject_login = Some(text.to_string());
        self
    }

    pub fn build(self) -> Mailbox {
        self.mailbox
    }
}
