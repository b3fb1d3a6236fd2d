// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ShortBus
//!
//! ZeroMQ message transport for the ShortBus service bus. This crate is the
//! umbrella: it re-exports the member crates, maps file configuration onto
//! transport settings, and bootstraps a node with [`TransportHost`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shortbus::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = shortbus::config::load_config_or_default(None)?;
//! let _logging = shortbus::init_logging_from(&config)?;
//!
//! let host = TransportHost::start(&config)?;
//! let me = host.endpoint();
//! me.send(&OutboundMessage::new("text/plain", "hello-1", b"hi".to_vec()))?;
//!
//! let on_message = |_: &ReceiveContext| -> Option<MessageHandler> {
//!     Some(handler(|ctx| println!("{}", ctx.message_id())))
//! };
//! me.receive(&on_message, Duration::from_secs(1));
//! host.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`zmq`** (default): ZeroMQ sockets, the transport factory and [`TransportHost`]
//! - **`file-logging`**: rolling log files

use std::time::Duration;

pub use shortbus_config as config;
pub use shortbus_observability as observability;
pub use shortbus_transports as transports;

#[cfg(feature = "zmq")]
pub mod host;

#[cfg(feature = "zmq")]
pub use host::{HostError, HostResult, TransportHost};

use shortbus_config::ShortBusConfig;
use shortbus_observability::{CrateDebugFlags, LoggingGuard, LoggingOptions};
use shortbus_transports::{PortRange, TransportConfig};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transport settings described by the `[transport]` section
pub fn transport_config(config: &ShortBusConfig) -> TransportConfig {
    let t = &config.transport;

    let mut settings = TransportConfig::default()
        .with_poll_timeout(Duration::from_millis(t.poll_timeout_ms))
        .with_handoff_capacity(t.handoff_capacity)
        .with_min_frame_size(t.min_frame_size)
        .with_linger(Duration::from_millis(t.linger_ms))
        .with_shutdown_timeouts(
            Duration::from_millis(t.inbound_shutdown_timeout_ms),
            Duration::from_millis(t.outbound_shutdown_timeout_ms),
        )
        .with_ephemeral_ports(
            PortRange::new(t.ephemeral_port_start, t.ephemeral_port_end),
            t.port_probe_attempts,
        );

    settings = if t.send_timeout_ms < 0 {
        settings.with_no_send_timeout()
    } else {
        settings.with_send_timeout(Duration::from_millis(t.send_timeout_ms as u64))
    };

    if t.max_message_size == 0 {
        settings.max_message_size = None;
    } else {
        settings = settings.with_max_message_size(t.max_message_size);
    }

    settings.receive_buffer_bytes = t.receive_buffer_bytes;
    settings.send_buffer_bytes = t.send_buffer_bytes;
    settings
}

/// Logging options described by the `[logging]` section plus process debug flags
pub fn logging_options(config: &ShortBusConfig, debug_flags: CrateDebugFlags) -> LoggingOptions {
    let logging = &config.logging;
    LoggingOptions {
        level: logging.level.clone(),
        format: logging.format.parse().unwrap_or_default(),
        file_logging: logging.file_logging,
        log_dir: logging.directory.clone(),
        ..LoggingOptions::default()
    }
    .with_debug_flags(debug_flags)
}

/// Initialize logging from configuration, `--debug-*` arguments and `SHORTBUS_DEBUG`
pub fn init_logging_from(config: &ShortBusConfig) -> anyhow::Result<LoggingGuard> {
    let options = logging_options(config, shortbus_observability::parse_debug_flags());
    shortbus_observability::init_logging(&options)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use shortbus_config::ShortBusConfig;
    pub use shortbus_transports::prelude::*;

    #[cfg(feature = "zmq")]
    pub use crate::host::TransportHost;
}
