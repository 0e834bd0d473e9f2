//! Transport abstraction traits for hubwire.
//!
//! The connection is written against [`Connector`] so the session logic can
//! run over any byte stream, not only TCP.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Send attempted while no session is established. The message is dropped.
    #[error("Not connected to hub")]
    NotConnected,

    /// The configured host is empty.
    #[error("Invalid host configuration")]
    InvalidHost,

    /// `connect` was called while the connection is already running.
    #[error("Connection already started")]
    AlreadyStarted,

    /// Connect attempt did not complete in time.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No inbound traffic within the idle timeout.
    #[error("Idle timeout after {0:?}")]
    IdleTimeout(Duration),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] hubwire_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of the hub session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not running, or stopped by `disconnect()`.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Session established; sends are accepted.
    Connected,
    /// Waiting out the reconnect delay.
    Reconnecting,
}

impl ConnectionState {
    /// Name used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bidirectional byte stream to the hub.
pub trait HubStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> HubStream for T {}

/// A boxed hub stream.
pub type BoxedStream = Box<dyn HubStream>;

/// Opens streams to the hub.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new stream to `host:port`.
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, TransportError>;

    /// Get the connector name (e.g., "tcp").
    fn name(&self) -> &'static str;
}

/// Receives every message framed off the wire, in arrival order.
pub trait InboundHandler: Send + Sync {
    /// Handle one complete message.
    fn on_message(&self, message: &str);
}

impl<F> InboundHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_message(&self, message: &str) {
        self(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
    }

    #[test]
    fn test_closure_handler() {
        let seen = std::sync::Mutex::new(Vec::new());
        let handler = |m: &str| seen.lock().unwrap().push(m.to_string());
        handler.on_message("hello");
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }
}
