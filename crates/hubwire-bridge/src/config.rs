//! Bridge configuration.
//!
//! Configuration can be loaded from:
//! - A path given with `--config`
//! - `hubwire.toml` in the usual locations
//! - Environment variables (HUBWIRE_HOST, HUBWIRE_PORT) for the defaults

use anyhow::{Context, Result};
use hubwire_protocol::DeviceKind;
use hubwire_transport::{ConnectionConfig, OverflowPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hub host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Hub port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connection tuning.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Configured lightbulbs.
    #[serde(default)]
    pub lightbulbs: Vec<DeviceConfig>,

    /// Configured switches.
    #[serde(default)]
    pub switches: Vec<DeviceConfig>,

    /// Configured televisions.
    #[serde(default)]
    pub televisions: Vec<DeviceConfig>,
}

/// Connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Delay before each reconnect attempt, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Connect attempt timeout, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Reconnect after this long without traffic. Unset disables it.
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,

    /// Receive buffer limit in bytes. 0 leaves the buffer unbounded.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,

    /// What to do when the receive buffer limit is hit.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device id on the hub.
    #[serde(default)]
    pub id: u64,

    /// Display name.
    #[serde(default)]
    pub name: String,
}

// Default value functions
fn default_host() -> String {
    std::env::var("HUBWIRE_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_port() -> u16 {
    std::env::var("HUBWIRE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(50005)
}

fn default_reconnect_delay() -> u64 {
    5_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_max_buffer_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connection: ConnectionSettings::default(),
            metrics: MetricsConfig::default(),
            lightbulbs: Vec::new(),
            switches: Vec::new(),
            televisions: Vec::new(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay(),
            connect_timeout_ms: default_connect_timeout(),
            idle_timeout_ms: None,
            max_buffer_bytes: default_max_buffer_bytes(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or if an explicit `path` does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            let expanded = shellexpand::tilde(path);
            return Self::from_file(expanded.as_ref());
        }

        let config_paths = [
            "hubwire.toml",
            "/etc/hubwire/hubwire.toml",
            "~/.config/hubwire/hubwire.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Settings for the hub connection.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        let settings = &self.connection;
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            idle_timeout: settings.idle_timeout_ms.map(Duration::from_millis),
            max_buffer_size: (settings.max_buffer_bytes > 0).then_some(settings.max_buffer_bytes),
            overflow_policy: settings.overflow_policy,
        }
    }

    /// Configured devices with their kind.
    ///
    /// Entries without an id or a name are skipped with a warning.
    #[must_use]
    pub fn devices(&self) -> Vec<(DeviceKind, DeviceConfig)> {
        let groups = [
            (DeviceKind::Lightbulb, &self.lightbulbs),
            (DeviceKind::Switch, &self.switches),
            (DeviceKind::Television, &self.televisions),
        ];

        let mut devices = Vec::new();
        for (kind, entries) in groups {
            if entries.is_empty() {
                info!(kind = %kind, "No devices configured");
                continue;
            }
            for device in entries {
                if device.id == 0 || device.name.trim().is_empty() {
                    warn!(kind = %kind, id = device.id, name = %device.name, "Skipping device with missing id or name");
                    continue;
                }
                devices.push((kind, device.clone()));
            }
        }
        devices
    }
}
