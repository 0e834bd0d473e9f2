//! Accessory-facing hub handle.
//!
//! One [`Hub`] exists per hub session. It owns the event router and the
//! connection, and is shared by `Arc` with every accessory handler.

use crate::metrics;
use hubwire_core::{Dispatcher, EventRouter, RouterError, SubscriptionId};
use hubwire_protocol::{RoutingKey, TypedCommand, Value};
use hubwire_transport::{
    CommandSender, ConnectionConfig, ConnectionState, Connector, HubConnection, TransportError,
};
use std::sync::Arc;
use tracing::info;

/// Handle used by accessories to receive hub events and issue commands.
#[derive(Debug)]
pub struct Hub {
    router: Arc<EventRouter>,
    connection: HubConnection,
    sender: CommandSender,
}

impl Hub {
    /// Create a hub handle. Call [`start`](Self::start) to connect.
    #[must_use]
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let connection = HubConnection::new(config, connector);
        Self {
            router: Arc::new(EventRouter::new()),
            sender: CommandSender::new(connection.clone()),
            connection,
        }
    }

    /// Connect to the hub and start routing inbound events.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty or the hub is already started.
    pub fn start(&self) -> Result<(), TransportError> {
        let dispatcher = Dispatcher::new(Arc::clone(&self.router));
        self.connection.connect(move |message: &str| {
            metrics::record_message("inbound");
            if !dispatcher.dispatch_or_discard(message) {
                metrics::record_malformed();
            }
        })
    }

    /// Disconnect and stop reconnecting.
    pub async fn shutdown(&self) {
        info!("Shutting down hub connection");
        self.connection.disconnect().await;
    }

    /// Register `handler` for events on `device_type:id:command`.
    pub fn subscribe<F>(&self, device_type: &str, id: u64, command: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let id = self
            .router
            .subscribe(&RoutingKey::new(device_type, id, command), handler);
        metrics::set_subscriptions(self.router.stats().subscription_count);
        id
    }

    /// Remove a handler registered with [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), RouterError> {
        self.router.unsubscribe(id)?;
        metrics::set_subscriptions(self.router.stats().subscription_count);
        Ok(())
    }

    /// Send a command to the hub.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if the hub is not connected;
    /// the command is dropped.
    pub fn send_command(
        &self,
        device_type: &str,
        id: u64,
        command: &str,
        value: Option<Value>,
    ) -> Result<(), TransportError> {
        let result = self.sender.send_command(device_type, id, command, value);
        Self::record_send(&result);
        result
    }

    /// Send a typed command to the hub.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Self::send_command).
    pub fn send_typed(&self, command: &TypedCommand) -> Result<(), TransportError> {
        let result = self.sender.send_typed(command);
        Self::record_send(&result);
        result
    }

    /// The event router.
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// The hub connection.
    #[must_use]
    pub fn connection(&self) -> &HubConnection {
        &self.connection
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    fn record_send(result: &Result<(), TransportError>) {
        match result {
            Ok(()) => metrics::record_message("outbound"),
            Err(TransportError::NotConnected) => metrics::record_send_dropped(),
            Err(_) => {}
        }
    }
}
