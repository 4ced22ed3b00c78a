//! UID SEARCH command handler.
//!
//! Supports `ALL`, `SEEN`, `UNSEEN` and the `NOT`/`OR`/`AND`
//! combinators; other keys match everything. The response lists the
//! matching UIDs (RFC 3501 Section 7.2.5):
//!
//! ```text
//! * SEARCH 1 2 3
//! A0006 OK SEARCH completed
//! ```

use crate::fake_imap::io::{tagged, write_line};
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use imap_codec::imap_types::search::SearchKey;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_uid_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[SearchKey<'_>],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let _ = write_line(stream, &tagged(tag, "BAD", "No folder selected")).await;
        return;
    };

    let Some(folder) = mailbox.get_folder(folder_name) else {
        let _ = write_line(stream, &tagged(tag, "BAD", "Folder not found")).await;
        return;
    };

    let line = folder
        .emails
        .iter()
        .filter(|e| criteria.iter().all(|key| matches_key(e, key)))
        .fold(String::from("* SEARCH"), |mut acc, e| {
            acc.push(' ');
            acc.push_str(&e.uid.to_string());
            acc
        });

    if write_line(stream, &format!("{line}\r\n")).await.is_err() {
        return;
    }
    let _ = write_line(stream, &tagged(tag, "OK", "SEARCH completed")).await;
}

#[allow(clippy::match_same_arms)]
fn matches_key(email: &TestEmail, key: &SearchKey<'_>) -> bool {
    match key {
        SearchKey::All => true,
        SearchKey::Seen => email.seen,
        SearchKey::Unseen => !email.seen,
        SearchKey::And(keys) => keys.as_ref().iter().all(|k| matches_key(email, k)),
        SearchKey::Or(a, b) => matches_key(email, a) || matches_key(email, b),
        SearchKey::Not(k) => !matches_key(email, k),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::test_support::capture;
    use crate::fake_imap::mailbox::MailboxBuilder;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    async fn run(criteria: &[SearchKey<'_>], mailbox: &Mailbox, selected: Option<&str>) -> String {
        capture(|mut s| async move {
            handle_uid_search("A1", criteria, mailbox, selected, &mut s).await;
            (s, ())
        })
        .await
        .0
    }

    #[tokio::test]
    async fn all_returns_every_uid() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, true, RAW)
            .email(2, false, RAW)
            .email(5, true, RAW)
            .build();

        let output = run(&[SearchKey::All], &mailbox, Some("INBOX")).await;

        assert_eq!(output, "* SEARCH 1 2 5\r\nA1 OK SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn unseen_filters_seen() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, true, RAW)
            .email(2, false, RAW)
            .build();

        let output = run(&[SearchKey::Unseen], &mailbox, Some("INBOX")).await;

        assert!(output.starts_with("* SEARCH 2\r\n"));
    }

    #[tokio::test]
    async fn empty_folder_has_no_trailing_space() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let output = run(&[SearchKey::All], &mailbox, Some("INBOX")).await;

        assert!(output.starts_with("* SEARCH\r\n"));
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let output = run(&[SearchKey::All], &mailbox, None).await;

        assert_eq!(output, "A1 BAD No folder selected\r\n");
    }
}
