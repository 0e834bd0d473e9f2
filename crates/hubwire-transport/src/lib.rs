//! # hubwire-transport
//!
//! Transport layer for the hubwire bridge.
//!
//! - **Connector** - opens the byte stream to the hub (TCP in production)
//! - **HubConnection** - owns the session: connect, frame, reconnect, write
//! - **CommandSender** - encodes envelopes and hands them to the connection
//!
//! ## Connection lifecycle
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!       ▲                        │  ▲               │
//!       │                   fail │  │ delay    end/error/timeout
//!   disconnect()                 ▼  │               │
//!       └──────────────────── Reconnecting ◀────────┘
//! ```
//!
//! ```rust,ignore
//! use hubwire_transport::{CommandSender, ConnectionConfig, HubConnection, TcpConnector};
//!
//! let connection = HubConnection::new(ConnectionConfig::default(), TcpConnector::shared());
//! connection.connect(|message: &str| println!("hub says {message}"))?;
//!
//! let sender = CommandSender::new(connection.clone());
//! sender.send_command("Switch", 1, "power", Some(true.into()))?;
//! ```

pub mod connection;
pub mod sender;
pub mod tcp;
pub mod traits;

pub use connection::{ConnectionConfig, HubConnection, OverflowPolicy};
pub use sender::CommandSender;
pub use tcp::TcpConnector;
pub use traits::{BoxedStream, ConnectionState, Connector, HubStream, InboundHandler, TransportError};
