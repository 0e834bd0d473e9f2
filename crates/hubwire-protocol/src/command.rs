//! Typed device commands.
//!
//! The wire envelope is untyped. [`TypedCommand`] is a closed view over the
//! `(deviceType, command, value)` combinations the bridge knows about, and
//! converts to and from [`Envelope`] without changing the wire format.

use std::fmt;
use std::str::FromStr;

use crate::codec::ProtocolError;
use crate::envelope::{Envelope, Value};

/// Accessory categories the hub exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Lightbulb,
    Switch,
    Television,
}

impl DeviceKind {
    /// All known kinds.
    pub const ALL: [DeviceKind; 3] = [
        DeviceKind::Lightbulb,
        DeviceKind::Switch,
        DeviceKind::Television,
    ];

    /// The `deviceType` tag used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Lightbulb => "Lightbulb",
            DeviceKind::Switch => "Switch",
            DeviceKind::Television => "Television",
        }
    }

    /// Commands the hub reports as state changes for this kind.
    #[must_use]
    pub fn state_commands(&self) -> &'static [&'static str] {
        match self {
            DeviceKind::Lightbulb => &["power", "brightness"],
            DeviceKind::Switch => &["power"],
            DeviceKind::Television => &["power", "input", "volume", "mute"],
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Lightbulb" => Ok(DeviceKind::Lightbulb),
            "Switch" => Ok(DeviceKind::Switch),
            "Television" => Ok(DeviceKind::Television),
            other => Err(ProtocolError::InvalidCommand(format!(
                "unknown device type: {other}"
            ))),
        }
    }
}

/// Relative volume step for televisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VolumeDirection {
    Increment = 0,
    Decrement = 1,
}

impl TryFrom<i64> for VolumeDirection {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VolumeDirection::Increment),
            1 => Ok(VolumeDirection::Decrement),
            other => Err(ProtocolError::InvalidCommand(format!(
                "invalid volume selector: {other}"
            ))),
        }
    }
}

/// A command with its payload decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// On/off.
    Power(bool),
    /// Brightness percentage, 0-100.
    Brightness(u8),
    /// Active input identifier.
    Input(u32),
    /// Absolute volume, 0-100.
    Volume(u8),
    /// Relative volume step.
    VolumeSelector(VolumeDirection),
    /// Mute state.
    Mute(bool),
    /// Remote key code.
    RemoteKey(i64),
}

impl DeviceCommand {
    /// The `command` string used on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::Power(_) => "power",
            DeviceCommand::Brightness(_) => "brightness",
            DeviceCommand::Input(_) => "input",
            DeviceCommand::Volume(_) => "volume",
            DeviceCommand::VolumeSelector(_) => "volumeSelector",
            DeviceCommand::Mute(_) => "mute",
            DeviceCommand::RemoteKey(_) => "remoteKey",
        }
    }

    /// The wire payload.
    #[must_use]
    pub fn value(&self) -> Value {
        match *self {
            DeviceCommand::Power(on) | DeviceCommand::Mute(on) => Value::from(on),
            DeviceCommand::Brightness(level) | DeviceCommand::Volume(level) => Value::from(level),
            DeviceCommand::Input(input) => Value::from(input),
            DeviceCommand::VolumeSelector(direction) => Value::from(direction as u8),
            DeviceCommand::RemoteKey(key) => Value::from(key),
        }
    }

    /// Whether a device of `kind` accepts this command.
    #[must_use]
    pub fn supported_by(&self, kind: DeviceKind) -> bool {
        match self {
            DeviceCommand::Power(_) => true,
            DeviceCommand::Brightness(_) => kind == DeviceKind::Lightbulb,
            DeviceCommand::Input(_)
            | DeviceCommand::Volume(_)
            | DeviceCommand::VolumeSelector(_)
            | DeviceCommand::Mute(_)
            | DeviceCommand::RemoteKey(_) => kind == DeviceKind::Television,
        }
    }

    /// Decode a command from its wire name and payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] for unknown commands, missing
    /// payloads, or payloads out of range.
    pub fn parse(command: &str, value: Option<&Value>) -> Result<Self, ProtocolError> {
        let value = value.ok_or_else(|| {
            ProtocolError::InvalidCommand(format!("{command} requires a value"))
        })?;

        match command {
            "power" => Ok(DeviceCommand::Power(value.is_truthy())),
            "mute" => Ok(DeviceCommand::Mute(value.is_truthy())),
            "brightness" => percentage(command, value).map(DeviceCommand::Brightness),
            "volume" => percentage(command, value).map(DeviceCommand::Volume),
            "input" => integer(command, value)
                .and_then(|n| {
                    u32::try_from(n).map_err(|_| {
                        ProtocolError::InvalidCommand(format!("input out of range: {n}"))
                    })
                })
                .map(DeviceCommand::Input),
            "volumeSelector" => integer(command, value)
                .and_then(VolumeDirection::try_from)
                .map(DeviceCommand::VolumeSelector),
            "remoteKey" => integer(command, value).map(DeviceCommand::RemoteKey),
            other => Err(ProtocolError::InvalidCommand(format!(
                "unknown command: {other}"
            ))),
        }
    }
}

fn integer(command: &str, value: &Value) -> Result<i64, ProtocolError> {
    let parsed = match value {
        Value::Number(_) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.round() as i64)),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Bool(_) => None,
    };
    parsed.ok_or_else(|| {
        ProtocolError::InvalidCommand(format!("{command} expects a number, got {value}"))
    })
}

fn percentage(command: &str, value: &Value) -> Result<u8, ProtocolError> {
    let n = integer(command, value)?;
    if (0..=100).contains(&n) {
        Ok(n as u8)
    } else {
        Err(ProtocolError::InvalidCommand(format!(
            "{command} out of range: {n}"
        )))
    }
}

/// A command addressed to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedCommand {
    pub kind: DeviceKind,
    pub id: u64,
    pub command: DeviceCommand,
}

impl TypedCommand {
    /// Create a typed command, checking the command is valid for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if `kind` does not accept it.
    pub fn new(kind: DeviceKind, id: u64, command: DeviceCommand) -> Result<Self, ProtocolError> {
        if !command.supported_by(kind) {
            return Err(ProtocolError::InvalidCommand(format!(
                "{} does not support {}",
                kind,
                command.name()
            )));
        }
        Ok(Self { kind, id, command })
    }

    /// Convert to the untyped wire envelope.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.kind.as_str(), self.id, self.command.name())
            .with_value(self.command.value())
    }
}

impl TryFrom<&Envelope> for TypedCommand {
    type Error = ProtocolError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        let kind: DeviceKind = envelope.device_type.parse()?;
        let command = DeviceCommand::parse(&envelope.command, envelope.value.as_ref())?;
        TypedCommand::new(kind, envelope.id, command)
    }
}

impl From<TypedCommand> for Envelope {
    fn from(command: TypedCommand) -> Self {
        command.to_envelope()
    }
}
