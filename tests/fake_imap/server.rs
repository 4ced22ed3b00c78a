//! In-process fake IMAP server for integration testing
//!
//! # Connection lifecycle
//!
//! Production mailboxes are reached on port 993 with implicit TLS, so
//! the server starts the TLS handshake as soon as a client connects:
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   TLS handshake (self-signed certificate from rcgen)
//!       |
//!   Server sends greeting: "* OK IMAP4rev1 ready"
//!       |
//!   LOGIN -> ID -> LIST -> SELECT -> UID SEARCH -> UID FETCH
//!       |
//!   LOGOUT (also accepted before or after a failed LOGIN)
//! ```
//!
//! Each command line starts with a client-chosen tag that the server
//! echoes in its completion response; lines starting with `*` are
//! untagged data sent before that completion.

use super::handlers::{
    handle_id, handle_list, handle_login, handle_logout, handle_select, handle_uid_fetch,
    handle_uid_search, id_command_tag,
};
use super::io::{tagged, write_line};
use super::mailbox::Mailbox;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Counters the tests assert on.
#[derive(Debug, Default)]
struct Stats {
    connections: AtomicUsize,
    logouts: AtomicUsize,
}

/// A fake IMAP server on `127.0.0.1` with an OS-assigned port.
///
/// The mailbox is fixed at start; the server runs until dropped.
pub struct FakeImapServer {
    port: u16,
    stats: Arc<Stats>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Bind an ephemeral port, generate a self-signed certificate for
    /// `127.0.0.1` and spawn the accept loop.
    pub async fn start(mailbox: Mailbox) -> Self {
        // Tests race to install the provider; losing is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let mailbox = Arc::new(mailbox);
        let stats = Arc::new(Stats::default());

        let handle = {
            let stats = stats.clone();
            tokio::spawn(async move {
                while let Ok((stream, _addr)) = listener.accept().await {
                    stats.connections.fetch_add(1, Ordering::SeqCst);
                    let acceptor = acceptor.clone();
                    let mailbox = mailbox.clone();
                    let stats = stats.clone();
                    tokio::spawn(async move {
                        let Ok(tls_stream) = acceptor.accept(stream).await else {
                            return;
                        };
                        handle_imap_session(tls_stream, &mailbox, &stats).await;
                    });
                }
            })
        };

        Self {
            port,
            stats,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// TCP connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    /// LOGOUT commands received so far, in any session state.
    pub fn logout_count(&self) -> usize {
        self.stats.logouts.load(Ordering::SeqCst)
    }
}

impl Drop for FakeImapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Run the IMAP command loop over an established TLS stream.
///
/// ID is answered from the raw line; everything else is decoded with
/// imap-codec's `CommandCodec` and dispatched on `CommandBody`.
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    mailbox: &Mailbox,
    stats: &Stats,
) {
    let mut reader = BufReader::new(stream);
    let mut selected_folder: Option<String> = None;
    let codec = CommandCodec::default();

    if write_line(&mut reader, "* OK IMAP4rev1 Fake server ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(tag) = id_command_tag(trimmed) {
            handle_id(tag, &mut reader).await;
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            if write_line(&mut reader, &tagged(tag, "BAD", "Parse error"))
                .await
                .is_err()
            {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();

        match command.body {
            CommandBody::Login { .. } => {
                if !handle_login(tag, mailbox, &mut reader).await {
                    break;
                }
            }
            CommandBody::List { .. } => {
                handle_list(tag, mailbox, &mut reader).await;
            }
            CommandBody::Select { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                selected_folder = handle_select(tag, &name, mailbox, &mut reader).await;
            }
            CommandBody::Search {
                criteria,
                uid: true,
                ..
            } => {
                handle_uid_search(
                    tag,
                    criteria.as_ref(),
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Fetch {
                sequence_set,
                uid: true,
                ..
            } => {
                handle_uid_fetch(
                    tag,
                    &sequence_set,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Logout => {
                stats.logouts.fetch_add(1, Ordering::SeqCst);
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ => {
                if write_line(&mut reader, &tagged(tag, "BAD", "Unknown command"))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}
