//! Envelope types for the hub protocol.
//!
//! An envelope is the unit of exchange with the hub in both directions.
//! Inbound envelopes report device state, outbound envelopes carry commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Untyped command payload.
///
/// The hub never tags its payloads; interpretation belongs to whoever
/// subscribed to the routing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// `true` / `false`.
    Bool(bool),
    /// Any JSON number. Integers keep their integer representation on the wire.
    Number(serde_json::Number),
    /// A string payload.
    Text(String),
}

impl Value {
    /// Build a numeric value from a float. Returns `None` for NaN or infinity.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(Value::Number)
    }

    /// Get the value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as a signed integer, if it is an integral number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Get the value as a float, if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Loose truthiness, the way the hub treats power-style payloads.
    ///
    /// `false`, `0` and the empty string are falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
            Value::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(serde_json::Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(u8, u16, u32, u64, i8, i16, i32, i64);

/// The routing key `deviceType:id:command`.
///
/// Keys compare by their rendered string; there is no wildcard or prefix
/// matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Render a key from its parts.
    #[must_use]
    pub fn new(device_type: &str, id: u64, command: &str) -> Self {
        Self(format!("{device_type}:{id}:{command}"))
    }

    /// Get the rendered key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutingKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoutingKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A command or state-change message addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Accessory category, e.g. `Lightbulb`.
    pub device_type: String,
    /// Device identifier, unique within `device_type`.
    pub id: u64,
    /// Semantic action or state field, e.g. `power`.
    pub command: String,
    /// Optional payload. Remote-key presses and similar commands may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Envelope {
    /// Create an envelope without a value.
    #[must_use]
    pub fn new(device_type: impl Into<String>, id: u64, command: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            id,
            command: command.into(),
            value: None,
        }
    }

    /// Attach a value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The key this envelope routes under.
    #[must_use]
    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey::new(&self.device_type, self.id, &self.command)
    }

    /// Whether the required fields are present.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.device_type.is_empty() && !self.command.is_empty()
    }
}
