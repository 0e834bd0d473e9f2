//! # hubwire-core
//!
//! Event routing between the device hub and accessory handlers.
//!
//! - **Router** - publish/subscribe registry keyed by `deviceType:id:command`
//! - **Dispatcher** - turns inbound wire text into router publications
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Connection  │────▶│ Dispatcher  │────▶│   Router    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │  Handlers   │
//!                                         └─────────────┘
//! ```
//!
//! One router exists per hub session. It is shared by handle (`Arc`) with
//! every accessory handler instead of living in a global.

pub mod dispatch;
pub mod router;

pub use dispatch::Dispatcher;
pub use router::{EventRouter, Handler, RouterError, RouterStats, SubscriptionId};
