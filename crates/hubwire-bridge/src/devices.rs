//! Device state mirrors.
//!
//! Each configured device gets a mirror that subscribes to the state
//! commands its kind reports and keeps the latest value of each.

use crate::config::DeviceConfig;
use crate::hub::Hub;
use hubwire_core::SubscriptionId;
use hubwire_protocol::{DeviceCommand, DeviceKind, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

type StateTable = Arc<Mutex<HashMap<&'static str, Value>>>;

/// Last known state of one device, as reported by the hub.
#[derive(Debug)]
pub struct DeviceMirror {
    kind: DeviceKind,
    id: u64,
    name: String,
    state: StateTable,
    subscriptions: Vec<SubscriptionId>,
}

impl DeviceMirror {
    /// Subscribe a mirror for `device` on `hub`.
    #[must_use]
    pub fn attach(hub: &Hub, kind: DeviceKind, device: &DeviceConfig) -> Self {
        let state: StateTable = Arc::new(Mutex::new(HashMap::new()));

        let subscriptions = kind
            .state_commands()
            .iter()
            .map(|&command| {
                let state = Arc::clone(&state);
                let name = device.name.clone();
                hub.subscribe(kind.as_str(), device.id, command, move |value| {
                    let Some(value) = value else {
                        debug!(device = %name, command, "State event without value");
                        return;
                    };
                    info!(device = %name, command, value = %value, "Device state changed");
                    state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(command, value.clone());
                })
            })
            .collect();

        Self {
            kind,
            id: device.id,
            name: device.name.clone(),
            state,
            subscriptions,
        }
    }

    /// Device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Device id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest raw value reported for `command`.
    #[must_use]
    pub fn value(&self, command: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .cloned()
    }

    /// Latest value for `command`, decoded.
    #[must_use]
    pub fn command(&self, command: &str) -> Option<DeviceCommand> {
        let value = self.value(command)?;
        match DeviceCommand::parse(command, Some(&value)) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(device = %self.name, command, error = %e, "Unexpected state value");
                None
            }
        }
    }

    /// Stop following the hub.
    pub fn detach(self, hub: &Hub) {
        for id in self.subscriptions {
            if let Err(e) = hub.unsubscribe(id) {
                warn!(device = %self.name, error = %e, "Failed to unsubscribe");
            }
        }
    }
}

/// Attach a mirror for every configured device.
#[must_use]
pub fn register_devices(hub: &Hub, devices: &[(DeviceKind, DeviceConfig)]) -> Vec<DeviceMirror> {
    devices
        .iter()
        .map(|(kind, device)| DeviceMirror::attach(hub, *kind, device))
        .inspect(|mirror| {
            info!(kind = %mirror.kind(), id = mirror.id(), name = %mirror.name(), "Registered device");
        })
        .collect()
}
