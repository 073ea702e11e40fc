//! TCP connect and TLS 1.3 handshake.
//!
//! Connecting is split in two steps so the session can report
//! `Connecting` and `Handshaking` separately. Both steps are bounded by the
//! same timeout and both map every failure to [`OnemeError::ConnectFailed`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{OnemeError, Result};

/// Stream type of an open session.
pub type SessionStream = TlsStream<TcpStream>;

/// Build the default client configuration.
///
/// TLS 1.3 only, ring crypto, Mozilla roots from `webpki-roots`.
pub fn default_tls_config() -> Result<Arc<ClientConfig>> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Ok(Arc::new(tls13_config(roots)?))
}

/// TLS 1.3-only configuration trusting `roots`.
///
/// Fails with [`OnemeError::Tls`] if the crypto provider rejects TLS 1.3.
pub fn tls13_config(roots: rustls::RootCertStore) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Open a TCP connection to `host:port` within `timeout`.
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = format!("{host}:{port}");
    tracing::debug!(%addr, ?timeout, "opening TCP connection");

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(OnemeError::ConnectFailed { addr, source }),
        Err(_) => Err(OnemeError::ConnectFailed {
            addr,
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        }),
    }
}

/// Run the TLS handshake over `stream`, sending `host` as SNI.
pub async fn handshake(
    stream: TcpStream,
    host: &str,
    port: u16,
    config: Arc<ClientConfig>,
    timeout: Duration,
) -> Result<SessionStream> {
    let addr = format!("{host}:{port}");
    let server_name = ServerName::try_from(host.to_owned()).map_err(|e| {
        OnemeError::ConnectFailed {
            addr: addr.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        }
    })?;

    let connector = TlsConnector::from(config);
    match tokio::time::timeout(timeout, connector.connect(server_name, stream)).await {
        Ok(Ok(tls)) => {
            let (_, conn) = tls.get_ref();
            tracing::debug!(
                %addr,
                version = ?conn.protocol_version(),
                "TLS handshake complete"
            );
            Ok(tls)
        }
        Ok(Err(source)) => Err(OnemeError::ConnectFailed { addr, source }),
        Err(_) => Err(OnemeError::ConnectFailed {
            addr,
            source: io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"),
        }),
    }
}
