//! TLS and connection helpers
//!
//! Provides the low-level `connect()` used by [`ImapTransport`]
//! and the `bounded()` timeout wrapper shared by every IMAP command.
//!
//! [`ImapTransport`]: crate::session::ImapTransport

use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TLS-wrapped stream in the `futures` I/O flavour async-imap expects.
pub type TlsCompat = Compat<tokio_rustls::client::TlsStream<TcpStream>>;

/// An IMAP connection that has not logged in yet.
pub type ImapClient = async_imap::Client<TlsCompat>;

/// An authenticated IMAP session.
pub type AuthenticatedSession = async_imap::Session<TlsCompat>;

/// Run `fut`, failing with [`Error::Timeout`] once `limit` elapses.
pub async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout {
            operation,
            after: limit,
        })?
}

/// Build a TLS connector.
///
/// Uses the webpki root store unless `accept_invalid_certs` is set, in
/// which case every certificate is accepted (self-hosted bridges).
fn tls_connector(options: &ConnectOptions) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported TLS configuration: {e}")))?;

    let config = if options.accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Open a TLS-wrapped IMAP connection (implicit TLS).
///
/// Connects to `host:port` via TCP and performs the TLS handshake,
/// all within `options.connect_timeout`. The caller logs in.
pub async fn connect(host: &str, port: u16, options: &ConnectOptions) -> Result<ImapClient> {
    let addr = format!("{host}:{port}");
    debug!("Connecting to IMAP server at {}", addr);

    let handshake = async {
        let tcp_stream = TcpStream::connect((host, port)).await?;

        let connector = tls_connector(options)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;

        Ok::<_, Error>(async_imap::Client::new(tls_stream.compat()))
    };

    let client = bounded("IMAP connect", options.connect_timeout, handshake).await?;

    info!("Connected to IMAP server at {}", addr);
    Ok(client)
}

/// Certificate verifier that accepts any server certificate but still
/// checks handshake signatures with the provider's algorithms.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
