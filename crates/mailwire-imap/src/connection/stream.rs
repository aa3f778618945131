//! TCP and TLS transports.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// A transport that is either plaintext or TLS.
pub enum Transport {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Transport::Plain"),
            Self::Tls(_) => f.write_str("Transport::Tls"),
        }
    }
}

impl Transport {
    /// Upgrades a plaintext transport after a successful STARTTLS.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                tracing::debug!(host, "upgrading to TLS");
                let tls = handshake(host, tcp).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidState("transport is already TLS".to_string())),
        }
    }

    /// Returns true if the transport is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector trusting the webpki root certificates.
#[must_use]
pub fn tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn handshake(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
    let server_name =
        ServerName::try_from(host.to_string()).map_err(|e| Error::Tls(format!("{host}: {e}")))?;
    Ok(tls_connector().connect(server_name, tcp).await?)
}

/// Connects without TLS (for STARTTLS or local servers).
pub async fn connect_plain(host: &str, port: u16) -> Result<Transport> {
    let tcp = TcpStream::connect((host, port)).await?;
    tracing::debug!(host, port, "connected");
    Ok(Transport::Plain(tcp))
}

/// Connects with TLS from the start (port 993).
pub async fn connect_tls(host: &str, port: u16) -> Result<Transport> {
    let tcp = TcpStream::connect((host, port)).await?;
    let tls = handshake(host, tcp).await?;
    tracing::debug!(host, port, "connected with TLS");
    Ok(Transport::Tls(Box::new(tls)))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_transport_over_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = connect_plain("127.0.0.1", port).await.unwrap();
        accept.await.unwrap();
        assert!(!transport.is_tls());
        assert_eq!(format!("{transport:?}"), "Transport::Plain");
    }

    #[tokio::test]
    async fn test_invalid_server_name() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = connect_plain("127.0.0.1", port).await.unwrap();
        accept.await.unwrap();
        let err = transport.upgrade_to_tls("not a host name").await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }
}
