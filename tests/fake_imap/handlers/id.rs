//! ID command handler (RFC 2971).
//!
//! The client announces itself with a parenthesized list of key/value
//! strings; the server may answer with its own list or `NIL`. The line
//! is matched before imap-codec decoding, so the extension does not
//! need to be enabled there.
//!
//! ```text
//! A0002 ID ("name" "Merchant IMAP Client" "version" "0.1.0")
//! * ID NIL
//! A0002 OK ID completed
//! ```

use crate::fake_imap::io::{tagged, write_line};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The tag of `line` when it carries an ID command.
pub fn id_command_tag(line: &str) -> Option<&str> {
    let mut words = line.split_whitespace();
    let tag = words.next()?;
    let command = words.next()?;
    command.eq_ignore_ascii_case("ID").then_some(tag)
}

/// Handle the ID command. Reports no server identification.
pub async fn handle_id<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    if write_line(stream, "* ID NIL\r\n").await.is_err() {
        return;
    }
    let _ = write_line(stream, &tagged(tag, "OK", "ID completed")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::test_support::capture;

    #[test]
    fn recognizes_id_lines() {
        assert_eq!(
            id_command_tag("A0002 ID (\"name\" \"client\")"),
            Some("A0002")
        );
        assert_eq!(id_command_tag("a9 id NIL"), Some("a9"));
    }

    #[test]
    fn ignores_other_commands() {
        assert_eq!(id_command_tag("A0003 IDLE"), None);
        assert_eq!(id_command_tag("A0004 LIST \"\" \"*\""), None);
        assert_eq!(id_command_tag("A0005"), None);
    }

    #[tokio::test]
    async fn answers_nil_then_ok() {
        let (output, ()) = capture(|mut s| async move {
            handle_id("A7", &mut s).await;
            (s, ())
        })
        .await;

        assert_eq!(output, "* ID NIL\r\nA7 OK ID completed\r\n");
    }
}
