//! SELECT command handler.
//!
//! Works for listed and unlisted folders alike. Sends the untagged
//! data RFC 3501 Section 6.3.1 requires (FLAGS, EXISTS, RECENT) plus
//! UIDVALIDITY and UIDNEXT, then the tagged OK.
//!
//! Returns the selected folder name (or `None` if not found).

use crate::fake_imap::io::{tagged, write_line};
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let _ = write_line(stream, &tagged(tag, "NO", "Folder not found")).await;
        return None;
    };

    let uidnext = folder
        .emails
        .iter()
        .map(|e| e.uid)
        .max()
        .map_or(1, |max| max + 1);

    let untagged = [
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.emails.len()),
        "* 0 RECENT\r\n".to_string(),
        "* OK [UIDVALIDITY 1] UIDs valid\r\n".to_string(),
        format!("* OK [UIDNEXT {uidnext}] Predicted next UID\r\n"),
    ];
    for line in &untagged {
        if write_line(stream, line).await.is_err() {
            return None;
        }
    }

    let _ = write_line(stream, &tagged(tag, "OK", "[READ-WRITE] SELECT completed")).await;
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::test_support::capture;
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(folder: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        capture(|mut s| async move {
            let selected = handle_select("A4", folder, mailbox, &mut s).await;
            (s, selected)
        })
        .await
    }

    #[tokio::test]
    async fn reports_exists_and_uidnext() {
        let raw = b"Subject: x\r\n\r\nbody";
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(3, false, raw)
            .email(9, true, raw)
            .build();

        let (output, selected) = run("INBOX", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(output.contains("* 2 EXISTS\r\n"));
        assert!(output.contains("[UIDNEXT 10]"));
        assert!(output.ends_with("A4 OK [READ-WRITE] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn selects_unlisted_folder() {
        let mailbox = MailboxBuilder::new().unlisted_folder("INBOX").build();

        let (_, selected) = run("INBOX", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
    }

    #[tokio::test]
    async fn missing_folder_returns_no() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let (output, selected) = run("Archive", &mailbox).await;

        assert!(selected.is_none());
        assert_eq!(output, "A4 NO Folder not found\r\n");
    }
}
