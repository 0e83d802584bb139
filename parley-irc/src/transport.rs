//! TCP and TLS transport for the IRC session.

use crate::traits::{ChannelError, ChannelResult, Connection, Connector};
use async_trait::async_trait;
use parley_common::IrcConfig;
use rustls_pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls;

const READ_BUFFER_SIZE: usize = 4096;

/// Any bidirectional byte stream a connection can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Connection over an arbitrary byte stream.
pub struct StreamConnection {
    stream: Box<dyn AsyncStream>,
    buf: Vec<u8>,
}

impl StreamConnection {
    pub fn new<S: AsyncStream + 'static>(stream: S) -> Self {
        Self {
            stream: Box::new(stream),
            buf: vec![0; READ_BUFFER_SIZE],
        }
    }
}

#[async_trait]
impl Connection for StreamConnection {
    async fn send(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("write failed: {e}")))?;
        self.stream
            .flush()
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("flush failed: {e}")))
    }

    async fn receive(&mut self) -> ChannelResult<Vec<u8>> {
        let n = self
            .stream
            .read(&mut self.buf)
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("read failed: {e}")))?;

        if n == 0 {
            return Err(ChannelError::ConnectionLost(
                "connection closed by peer".into(),
            ));
        }
        Ok(self.buf[..n].to_vec())
    }
}

/// Connects to an IRC server over TCP, optionally wrapped in TLS.
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: bool,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, tls: bool, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            timeout,
        }
    }

    pub fn from_config(config: &IrcConfig) -> Self {
        Self::new(
            config.server.clone(),
            config.port,
            config.tls,
            config.connect_timeout(),
        )
    }

    async fn open(&self) -> ChannelResult<StreamConnection> {
        // Validated before dialing
        let server_name = if self.tls {
            Some(
                ServerName::try_from(self.host.clone()).map_err(|e| {
                    ChannelError::Connection(format!("Invalid TLS server name: {e}"))
                })?,
            )
        } else {
            None
        };

        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| ChannelError::Connection(format!("TCP connect failed: {e}")))?;
        let _ = tcp.set_nodelay(true);

        let Some(server_name) = server_name else {
            return Ok(StreamConnection::new(tcp));
        };

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ChannelError::Connection(format!("TLS handshake failed: {e}")))?;

        Ok(StreamConnection::new(stream))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn endpoint(&self) -> String {
        let scheme = if self.tls { "ircs" } else { "irc" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> ChannelResult<Box<dyn Connection>> {
        let connection = tokio::time::timeout(self.timeout, self.open())
            .await
            .map_err(|_| {
                ChannelError::Connection(format!(
                    "connect timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        tracing::info!(endpoint = %self.endpoint(), "Connected to IRC server");
        Ok(Box::new(connection))
    }
}
