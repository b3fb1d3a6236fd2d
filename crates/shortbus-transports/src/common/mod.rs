//! Common types and utilities for all transports

pub mod config;
pub mod context;
pub mod error;
pub mod stats;

pub use config::{PortRange, TransportConfig};
pub use context::{
    handler, DispatchResolver, MessageHandler, OutboundMessage, ReceiveContext, SendContext,
};
pub use error::{TransportError, TransportResult};
pub use stats::{InboundStats, OutboundStats};
