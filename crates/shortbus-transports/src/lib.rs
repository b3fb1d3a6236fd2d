// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # shortbus-transports
//!
//! Point-to-point message transport for the ShortBus runtime over ZeroMQ.
//!
//! ## Components
//!
//! - **Address resolution**: parses `scheme://host:port/path`, decides whether
//!   an address belongs to this process, and remaps local control channels
//!   onto freshly allocated ephemeral ports
//! - **Envelope**: self-contained binary framing of content type, message id
//!   and opaque body
//! - **Inbound**: ROUTER socket with a dedicated receive loop feeding a
//!   bounded hand-off queue, drained by callers through a dispatch resolver
//! - **Outbound**: DEALER socket, connected lazily on first send, drained by a
//!   dedicated send loop in submission order
//! - **Factory**: one transport per address and direction, plus duplex
//!   composition (loopback for local addresses)
//!
//! ## Feature Flags
//!
//! - `zmq` (default): ZeroMQ sockets, loopback, duplex and the factory
//!
//! Without `zmq` only the addressing, envelope and trait layers are built.
//!
//! ## Example: Loopback
//!
//! ```no_run
//! use shortbus_transports::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ports = Arc::new(LocalPorts::new());
//! ports.register(5005);
//!
//! let resolver = Arc::new(AddressResolver::new(ports));
//! let factory = ZeroMqTransportFactory::new(resolver, TransportConfig::default())?;
//! let duplex = factory.build_duplex(&TransportSettings::new("tcp://Current:5005/orders"))?;
//!
//! duplex.send(&OutboundMessage::json("abc-123", &vec![1, 2, 3])?)?;
//!
//! let on_message = |_: &ReceiveContext| -> Option<MessageHandler> {
//!     Some(handler(|ctx| println!("{} bytes", ctx.body().len())))
//! };
//! duplex.receive(&on_message, Duration::from_secs(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Common**: errors, configuration, contexts, counters
//! 2. **Traits**: transport-agnostic interfaces
//! 3. **Implementations**: ZMQ sockets and their composition

pub mod address;
pub mod common;
pub mod envelope;
pub mod traits;

#[cfg(feature = "zmq")]
pub mod zmq;

// Re-export commonly used types
pub use address::{AddressResolver, LocalPorts, PortAllocator, ZeroMqAddress};
pub use common::{
    handler, DispatchResolver, InboundStats, MessageHandler, OutboundMessage, OutboundStats,
    PortRange, ReceiveContext, SendContext, TransportConfig, TransportError, TransportResult,
};
pub use envelope::Envelope;
pub use traits::{
    DropReason, InboundTransport, OutboundTransport, ReceiveOutcome, Transport, TransportStats,
};

#[cfg(feature = "zmq")]
pub use zmq::{
    DuplexTransport, LoopbackSender, TransportSettings, ZeroMqTransportFactory, ZmqDealer,
    ZmqRouter,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::address::{AddressResolver, LocalPorts, ZeroMqAddress};
    pub use crate::common::*;
    pub use crate::envelope::Envelope;
    pub use crate::traits::*;

    #[cfg(feature = "zmq")]
    pub use crate::zmq::{
        DuplexTransport, LoopbackSender, TransportSettings, ZeroMqTransportFactory, ZmqDealer,
        ZmqRouter,
    };
}
