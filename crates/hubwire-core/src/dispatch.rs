//! Inbound message dispatch.
//!
//! Decodes framed wire text into envelopes and publishes them on the router.

use crate::router::{EventRouter, RouterError};
use hubwire_protocol::codec;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bridges decoded hub messages to the event router.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    router: Arc<EventRouter>,
}

impl Dispatcher {
    /// Create a dispatcher publishing on `router`.
    #[must_use]
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }

    /// The router events are published on.
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Decode one message and publish it.
    ///
    /// Returns the number of handlers that received the event.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Protocol`] if the message is malformed. Nothing
    /// is published in that case.
    pub fn dispatch(&self, message: &str) -> Result<usize, RouterError> {
        let envelope = codec::decode(message)?;
        let key = envelope.routing_key();

        debug!(key = %key, value = ?envelope.value, "Received event from hub");

        Ok(self.router.publish(&key, envelope.value.as_ref()))
    }

    /// Dispatch a message, logging and discarding it if malformed.
    ///
    /// Returns `false` if the message was discarded.
    pub fn dispatch_or_discard(&self, message: &str) -> bool {
        match self.dispatch(message) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, message = %message, "Discarding message from hub");
                false
            }
        }
    }
}
