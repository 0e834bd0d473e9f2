//! Outbound command sender.
//!
//! Fire-and-forget: no retries, no acknowledgement tracking. The only
//! confirmation a command took effect is a later state event from the hub.

use hubwire_protocol::{codec, Envelope, TypedCommand, Value};
use tracing::debug;

use crate::connection::HubConnection;
use crate::traits::TransportError;

/// Encodes envelopes and hands them to the hub connection.
#[derive(Debug, Clone)]
pub struct CommandSender {
    connection: HubConnection,
}

impl CommandSender {
    /// Create a sender writing to `connection`.
    #[must_use]
    pub fn new(connection: HubConnection) -> Self {
        Self { connection }
    }

    /// Send an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if there is no session; the
    /// command is dropped.
    pub fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = codec::encode(envelope)?;
        debug!(key = %envelope.routing_key(), "Sending command to hub");
        self.connection.send(&text)
    }

    /// Send a command built from its parts.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_command(
        &self,
        device_type: &str,
        id: u64,
        command: &str,
        value: Option<Value>,
    ) -> Result<(), TransportError> {
        let envelope = Envelope {
            device_type: device_type.to_string(),
            id,
            command: command.to_string(),
            value,
        };
        self.send(&envelope)
    }

    /// Send a typed command.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_typed(&self, command: &TypedCommand) -> Result<(), TransportError> {
        self.send(&command.to_envelope())
    }
}
