//! # hubwire-protocol
//!
//! Wire protocol definitions for the hubwire device hub bridge.
//!
//! The hub speaks newline-delimited JSON over a plain TCP stream. Every
//! document is an [`Envelope`] addressed to one device and one command:
//!
//! ```text
//! {"deviceType":"Lightbulb","id":3,"command":"brightness","value":80}\n
//! ```
//!
//! This crate provides:
//!
//! - [`Envelope`] / [`Value`] / [`RoutingKey`] - the unit of exchange
//! - [`codec`] - envelope to/from wire text
//! - [`FrameDecoder`] - splits the inbound byte stream into messages
//! - [`DeviceCommand`] - typed view over the untyped `command`/`value` pair
//!
//! ## Example
//!
//! ```rust
//! use hubwire_protocol::{codec, Envelope, FrameDecoder};
//!
//! let envelope = Envelope::new("Switch", 1, "power").with_value(true);
//! let line = codec::encode(&envelope).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.feed(format!("{line}\n").as_bytes());
//! let message = decoder.next_message().unwrap().unwrap();
//! assert_eq!(codec::decode(&message).unwrap(), envelope);
//! ```

pub mod codec;
pub mod command;
pub mod envelope;
pub mod framing;

pub use codec::{decode, encode, ProtocolError};
pub use command::{DeviceCommand, DeviceKind, TypedCommand, VolumeDirection};
pub use envelope::{Envelope, RoutingKey, Value};
pub use framing::{FrameDecoder, DEFAULT_MAX_BUFFER_SIZE, DELIMITER};
