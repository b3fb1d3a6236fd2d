// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node bootstrap
//!
//! A [`TransportHost`] is what a bus process starts with: a receive port that
//! is registered as local, a receive address built from the machine and
//! process names, and a factory every other transport comes from.

use std::sync::Arc;

use shortbus_config::ShortBusConfig;
use shortbus_transports::address::{AddressResolver, LocalPorts};
use shortbus_transports::prelude::*;
use tracing::{info, warn};

use crate::transport_config;

/// Fresh ports tried when an allocated receive port turns out to be taken
const BIND_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Could not listen on {uri}")]
    NotListening { uri: String },
}

pub type HostResult<T> = Result<T, HostError>;

pub struct TransportHost {
    factory: Arc<ZeroMqTransportFactory>,
    endpoint: Arc<DuplexTransport>,
    receive_uri: String,
    subscription_service_uri: Option<String>,
}

impl TransportHost {
    /// Start a node with its own local port registry
    pub fn start(config: &ShortBusConfig) -> HostResult<Self> {
        Self::start_with_ports(config, Arc::new(LocalPorts::new()))
    }

    /// Start a node sharing `local_ports` with other hosts in this process
    pub fn start_with_ports(config: &ShortBusConfig, local_ports: Arc<LocalPorts>) -> HostResult<Self> {
        let settings = transport_config(config);
        let mut resolver = AddressResolver::from_config(local_ports, &settings);
        if let Some(machine_name) = config.node.machine_name() {
            resolver = resolver.with_machine_name(machine_name);
        }
        let resolver = Arc::new(resolver);
        let factory = Arc::new(ZeroMqTransportFactory::new(Arc::clone(&resolver), settings)?);

        let process_name = config.node.process_name.trim();
        let attempts = if config.node.receive_port().is_some() { 1 } else { BIND_ATTEMPTS };

        let mut last_uri = String::new();
        for attempt in 1..=attempts {
            let port = match config.node.receive_port() {
                Some(port) => port,
                None => resolver.allocator().allocate()?,
            };
            resolver.register_local_port(port);

            let receive_uri = format!("tcp://{}:{}/{}/", resolver.machine_name(), port, process_name);
            let endpoint = factory.build_duplex(&TransportSettings::new(receive_uri.as_str()))?;
            if endpoint.inbound().is_operational() {
                let subscription_service_uri = config
                    .node
                    .subscription_service_host()
                    .map(|host| format!("tcp://{}:{}/", host, config.node.subscription_service_port));

                info!(
                    "[HOST] Receiving on {} (subscription service: {})",
                    receive_uri,
                    subscription_service_uri.as_deref().unwrap_or("none")
                );
                return Ok(Self {
                    factory,
                    endpoint,
                    receive_uri,
                    subscription_service_uri,
                });
            }

            warn!("[HOST] Could not bind {} (attempt {}/{})", receive_uri, attempt, attempts);
            last_uri = receive_uri;
        }

        Err(HostError::NotListening { uri: last_uri })
    }

    /// Address this node receives on
    pub fn receive_address(&self) -> &ZeroMqAddress {
        self.endpoint.endpoint_address()
    }

    pub fn receive_uri(&self) -> &str {
        &self.receive_uri
    }

    /// The node's own duplex: receive here, sends loop back
    pub fn endpoint(&self) -> &Arc<DuplexTransport> {
        &self.endpoint
    }

    pub fn factory(&self) -> &Arc<ZeroMqTransportFactory> {
        &self.factory
    }

    pub fn subscription_service_uri(&self) -> Option<&str> {
        self.subscription_service_uri.as_deref()
    }

    /// Local duplex on a freshly allocated control port
    pub fn control_channel(&self) -> TransportResult<Arc<DuplexTransport>> {
        let uri = format!("{}{}", self.receive_uri, shortbus_transports::address::CONTROL_SEGMENT);
        self.factory.build_duplex(&TransportSettings::new(uri.as_str()))
    }

    /// Sender for `uri`: loopback when it is this node, a socket otherwise
    pub fn outbound_for(&self, uri: &str) -> TransportResult<Arc<dyn OutboundTransport>> {
        let duplex = self.factory.build_duplex(&TransportSettings::new(uri))?;
        Ok(Arc::clone(duplex.outbound()))
    }

    /// Shut down every transport the node created
    pub fn shutdown(&self) {
        info!("[HOST] Shutting down {}", self.receive_uri);
        self.factory.shutdown();
    }
}
