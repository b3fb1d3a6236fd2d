// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ transport implementations
//!
//! - **Inbound**: ROUTER socket, many DEALER peers fan in to one bound address
//! - **Outbound**: DEALER socket, one persistent connection per destination
//! - **Loopback**: same-process sends injected straight into the inbound queue
//! - **Factory**: one cached transport per address, plus duplex composition
//!
//! ## Example
//!
//! ```no_run
//! use shortbus_transports::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ports = Arc::new(LocalPorts::new());
//! ports.register(5005);
//! let resolver = Arc::new(AddressResolver::new(ports).with_machine_name("node-a"));
//! let factory = ZeroMqTransportFactory::new(resolver, TransportConfig::default())?;
//!
//! let duplex = factory.build_duplex(&TransportSettings::new("tcp://Current:5005/orders"))?;
//! duplex.send(&OutboundMessage::new("text/plain", "m-1", b"hello".to_vec()))?;
//!
//! let resolver = |ctx: &ReceiveContext| -> Option<MessageHandler> {
//!     println!("got {}", ctx.message_id());
//!     None
//! };
//! duplex.receive(&resolver, Duration::from_millis(500));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod duplex;
pub mod factory;
pub mod loopback;
pub mod server;

pub use client::{ConnectionState, ZmqDealer};
pub use duplex::DuplexTransport;
pub use factory::{Endpoint, TransportSettings, ZeroMqTransportFactory};
pub use loopback::LoopbackSender;
pub use server::{InboundState, ZmqRouter};

use tracing::{debug, Level};

/// Pretty-print JSON bodies into the debug log; never affects delivery
pub(crate) fn log_message_body(content_type: &str, body: &[u8]) {
    if !tracing::enabled!(Level::DEBUG) || !content_type.contains("json") {
        return;
    }
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            debug!("Msg=>\n{}", pretty);
        }
    }
}
