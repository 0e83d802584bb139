//! Traits at the seams of the IRC session: transport and message handling.

use crate::message::{ChannelMessage, OutgoingMessage};
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl ChannelError {
    /// Whether the error ends the current connection.
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionLost(_))
    }
}

/// An established byte-stream connection, plain or encrypted.
#[async_trait]
pub trait Connection: Send {
    /// Write raw bytes to the peer.
    async fn send(&mut self, bytes: &[u8]) -> ChannelResult<()>;

    /// Read the next chunk of bytes. An empty read is reported as
    /// [`ChannelError::ConnectionLost`], never as an empty chunk.
    async fn receive(&mut self) -> ChannelResult<Vec<u8>>;
}

/// Establishes connections to the configured endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable endpoint, used in logs.
    fn endpoint(&self) -> String;

    /// Open a new connection, negotiating TLS when configured.
    async fn connect(&self) -> ChannelResult<Box<dyn Connection>>;
}

/// Callback for processing incoming messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message, optionally producing a reply.
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Option<OutgoingMessage>>;
}

/// Simple echo handler for testing.
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Option<OutgoingMessage>> {
        Ok(Some(OutgoingMessage {
            target: message.channel,
            text: format!("Echo: {}", message.text),
        }))
    }
}
