//! apt-link: APT command frames and the links that carry them
//!
//! This crate provides the fixed-header frame codec spoken by modular motion controllers,
//! the address and command-id constants, and two transport capabilities: a write-only
//! [`FrameSink`] used for fire-and-forget provisioning and a [`RequestResponseChannel`]
//! used by the programming protocols. The default build enables a `mock` backend so that
//! binaries and tests run without hardware; the `serial` feature adds a serial/USB-CDC link.

mod types;
pub use types::{Address, PortInfo, Timestamp, EXTENDED_FLAG, HOST, MAX_SLOTS, MOTHERBOARD, SLOT_BASE};

mod frame;
pub use frame::{CommandFrame, FrameBody, HEADER_LEN, MAX_PAYLOAD};

pub mod commands;

mod error;
pub use error::{LinkError, Result};

mod traits;
pub use traits::{FrameSink, RequestResponseChannel};

mod shared;
pub use shared::SharedLink;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockLink, SentRecord};

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialLink, SerialSettings};
