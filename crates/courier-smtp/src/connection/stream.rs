//! Byte streams and connection establishment.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::Security;
use crate::error::{Error, Result};

/// Opens byte streams to SMTP servers.
///
/// The session only talks to the server through this trait, so tests and
/// embedders can supply their own streams.
pub trait Connector {
    /// Stream type produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Unpin;

    /// Connects to `host:port`. With [`Security::Tls`] the TLS handshake is
    /// part of connecting.
    fn connect(
        &self,
        host: &str,
        port: u16,
        security: Security,
    ) -> impl Future<Output = Result<Self::Stream>>;

    /// Performs the TLS handshake on a plaintext stream after STARTTLS.
    fn upgrade(
        &self,
        stream: Self::Stream,
        host: &str,
    ) -> impl Future<Output = Result<Self::Stream>>;
}

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(TcpStream),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connects over TCP and rustls.
#[derive(Clone)]
pub struct NetworkConnector {
    tls: TlsConnector,
}

impl NetworkConnector {
    /// Creates a connector trusting the webpki root certificates.
    #[must_use]
    pub fn new() -> Self {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self::with_tls_config(Arc::new(config))
    }

    /// Creates a connector with a custom TLS configuration.
    #[must_use]
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }

    async fn handshake(&self, tcp: TcpStream, host: &str) -> Result<SmtpStream> {
        let server_name = ServerName::try_from(host.to_string())?;
        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(Error::TlsHandshake)?;
        tracing::debug!(host, "TLS handshake complete");
        Ok(SmtpStream::Tls(Box::new(tls)))
    }
}

impl Default for NetworkConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NetworkConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConnector").finish_non_exhaustive()
    }
}

impl Connector for NetworkConnector {
    type Stream = SmtpStream;

    async fn connect(&self, host: &str, port: u16, security: Security) -> Result<SmtpStream> {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|source| Error::Connect {
                host: host.to_string(),
                port,
                source,
            })?;
        tracing::debug!(host, port, "TCP connection established");

        match security {
            Security::Tls => self.handshake(tcp, host).await,
            Security::Plain | Security::StartTls => Ok(SmtpStream::Tcp(tcp)),
        }
    }

    async fn upgrade(&self, stream: SmtpStream, host: &str) -> Result<SmtpStream> {
        match stream {
            SmtpStream::Tcp(tcp) => self.handshake(tcp, host).await,
            SmtpStream::Tls(_) => Err(Error::InvalidState("Stream is already TLS".into())),
        }
    }
}
