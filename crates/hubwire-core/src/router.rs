//! Publish/subscribe router for hub events.
//!
//! Handlers subscribe to an exact routing key and are invoked, in
//! registration order, every time an event is published under that key.

use dashmap::DashMap;
use hubwire_protocol::{ProtocolError, RoutingKey, Value};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, trace};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No subscription with this id is registered.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    /// Inbound text could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// An event handler. Receives the envelope value, if any.
pub type Handler = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// The raw id.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// The event router.
///
/// Keys match exactly. Subscribing the same key twice registers two handlers;
/// both fire. Handlers are invoked without any router lock held, so a handler
/// may itself subscribe or publish.
pub struct EventRouter {
    /// Handlers indexed by rendered routing key.
    routes: DashMap<String, Vec<Subscription>>,
    /// Subscription id -> routing key, for unsubscribe.
    owners: DashMap<SubscriptionId, String>,
    next_id: AtomicU64,
}

impl EventRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating event router");
        Self {
            routes: DashMap::new(),
            owners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` under `key`.
    ///
    /// There is no uniqueness check: every call adds a handler.
    pub fn subscribe<F>(&self, key: &RoutingKey, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.subscribe_handler(key, Arc::new(handler))
    }

    /// Register an already shared handler under `key`.
    pub fn subscribe_handler(&self, key: &RoutingKey, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut entry = self.routes.entry(key.as_str().to_string()).or_default();
        entry.push(Subscription { id, handler });
        let subscribers = entry.len();
        drop(entry);

        self.owners.insert(id, key.as_str().to_string());

        debug!(key = %key, subscription = %id, subscribers, "Subscribed");
        id
    }

    /// Remove one handler.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownSubscription`] if `id` is not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), RouterError> {
        let (_, key) = self
            .owners
            .remove(&id)
            .ok_or(RouterError::UnknownSubscription(id))?;

        let now_empty = match self.routes.get_mut(&key) {
            Some(mut entry) => {
                entry.retain(|s| s.id != id);
                entry.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.routes.remove_if(&key, |_, subs| subs.is_empty());
        }

        debug!(key = %key, subscription = %id, "Unsubscribed");
        Ok(())
    }

    /// Invoke every handler registered under `key`, in registration order.
    ///
    /// A panicking handler is logged and skipped; its siblings still run.
    /// Returns the number of handlers that completed.
    pub fn publish(&self, key: &RoutingKey, value: Option<&Value>) -> usize {
        let handlers: Vec<Handler> = match self.routes.get(key.as_str()) {
            Some(entry) => entry.iter().map(|s| Arc::clone(&s.handler)).collect(),
            None => {
                trace!(key = %key, "No subscribers");
                return 0;
            }
        };

        let mut completed = 0;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    error!(
                        key = %key,
                        panic = panic_message(panic.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }

        trace!(key = %key, recipients = completed, "Published event");
        completed
    }

    /// Number of handlers registered under `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &RoutingKey) -> usize {
        self.routes.get(key.as_str()).map(|e| e.len()).unwrap_or(0)
    }

    /// Whether any handler is registered under `key`.
    #[must_use]
    pub fn has_subscribers(&self, key: &RoutingKey) -> bool {
        self.subscriber_count(key) > 0
    }

    /// All keys with at least one handler.
    #[must_use]
    pub fn keys(&self) -> Vec<RoutingKey> {
        self.routes
            .iter()
            .map(|e| RoutingKey::from(e.key().clone()))
            .collect()
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            key_count: self.routes.len(),
            subscription_count: self.owners.len(),
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("stats", &self.stats())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Router statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    /// Number of keys with at least one handler.
    pub key_count: usize,
    /// Total number of registered handlers.
    pub subscription_count: usize,
}
