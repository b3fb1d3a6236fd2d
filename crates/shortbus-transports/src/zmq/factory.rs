// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport construction and caching
//!
//! One live transport per canonical address and direction. Every cache lookup
//! and construction happens under that cache's lock, so concurrent first
//! requests for the same key build exactly one socket. Lock order is duplex
//! before inbound/outbound.

use crate::address::{AddressResolver, ZeroMqAddress};
use crate::common::{TransportConfig, TransportResult};
use crate::traits::{InboundTransport, OutboundTransport, Transport};
use crate::zmq::{DuplexTransport, LoopbackSender, ZmqDealer, ZmqRouter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// URI scheme handled by this factory
pub const SCHEME: &str = "tcp";

/// Where a transport should live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Raw URI, resolved by the factory
    Uri(String),
    /// Already resolved; used as is so control ports are not reallocated
    Resolved(ZeroMqAddress),
}

/// Input to the factory's build operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    endpoint: Endpoint,
}

impl TransportSettings {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Uri(uri.into()),
        }
    }

    pub fn from_address(address: ZeroMqAddress) -> Self {
        Self {
            endpoint: Endpoint::Resolved(address),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The URI as the caller asked for it
    pub fn requested_uri(&self) -> &str {
        match &self.endpoint {
            Endpoint::Uri(uri) => uri,
            Endpoint::Resolved(address) => address.raw_uri(),
        }
    }
}

impl From<&str> for TransportSettings {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<ZeroMqAddress> for TransportSettings {
    fn from(address: ZeroMqAddress) -> Self {
        Self::from_address(address)
    }
}

pub struct ZeroMqTransportFactory {
    context: zmq::Context,
    resolver: Arc<AddressResolver>,
    config: TransportConfig,
    inbound: Mutex<HashMap<String, Arc<ZmqRouter>>>,
    outbound: Mutex<HashMap<String, Arc<ZmqDealer>>>,
    duplex: Mutex<HashMap<String, Arc<DuplexTransport>>>,
}

impl ZeroMqTransportFactory {
    /// Create a factory with its own ZMQ context
    pub fn new(resolver: Arc<AddressResolver>, config: TransportConfig) -> TransportResult<Self> {
        Self::with_context(zmq::Context::new(), resolver, config)
    }

    /// Create a factory sharing an existing ZMQ context
    pub fn with_context(
        context: zmq::Context,
        resolver: Arc<AddressResolver>,
        config: TransportConfig,
    ) -> TransportResult<Self> {
        config.validate()?;
        debug!(
            "[ZMQ-FACTORY] Created transport factory for machine {}",
            resolver.machine_name()
        );
        Ok(Self {
            context,
            resolver,
            config,
            inbound: Mutex::new(HashMap::new()),
            outbound: Mutex::new(HashMap::new()),
            duplex: Mutex::new(HashMap::new()),
        })
    }

    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    pub fn resolver(&self) -> &Arc<AddressResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn resolve(&self, settings: &TransportSettings) -> TransportResult<ZeroMqAddress> {
        match settings.endpoint() {
            Endpoint::Uri(uri) => self.resolver.resolve(uri),
            Endpoint::Resolved(address) => Ok(address.clone()),
        }
    }

    /// Receiving transport for the settings' address, cached by canonical URI
    ///
    /// A transport that failed to bind is returned but not cached.
    pub fn build_inbound(&self, settings: &TransportSettings) -> TransportResult<Arc<ZmqRouter>> {
        let address = self.resolve(settings)?;

        let mut cache = self.inbound.lock();
        if let Some(existing) = cache.get(address.uri()) {
            return Ok(Arc::clone(existing));
        }

        let inbound = Arc::new(ZmqRouter::new(
            self.context.clone(),
            address.clone(),
            self.config.clone(),
        ));
        if inbound.is_operational() {
            cache.insert(address.uri().to_string(), Arc::clone(&inbound));
        } else {
            warn!(
                "[ZMQ-FACTORY] Receive transport for {} is not operational and will not be cached",
                address
            );
        }
        Ok(inbound)
    }

    /// Sending transport for the settings' address, cached by canonical URI
    pub fn build_outbound(&self, settings: &TransportSettings) -> TransportResult<Arc<ZmqDealer>> {
        let address = self.resolve(settings)?;

        let mut cache = self.outbound.lock();
        if let Some(existing) = cache.get(address.uri()) {
            return Ok(Arc::clone(existing));
        }

        let outbound = Arc::new(ZmqDealer::new(
            self.context.clone(),
            address.clone(),
            self.config.clone(),
        ));
        cache.insert(address.uri().to_string(), Arc::clone(&outbound));
        Ok(outbound)
    }

    /// Both directions for one address, cached by the requested URI
    ///
    /// Local addresses get a real receiver whose send side loops straight back
    /// into it. Remote addresses get a real sender and an empty receiver.
    pub fn build_duplex(&self, settings: &TransportSettings) -> TransportResult<Arc<DuplexTransport>> {
        let key = settings.requested_uri().to_string();

        let mut cache = self.duplex.lock();
        if let Some(existing) = cache.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let address = self.resolve(settings)?;
        let resolved = TransportSettings::from_address(address.clone());

        let (duplex, cacheable) = if address.is_local() {
            let inbound = self.build_inbound(&resolved)?;
            let operational = inbound.is_operational();
            let inbound: Arc<dyn InboundTransport> = inbound;
            let outbound: Arc<dyn OutboundTransport> =
                Arc::new(LoopbackSender::new(Arc::clone(&inbound)));
            info!("[ZMQ-FACTORY] Loopback transport for {} ({})", key, address);
            (DuplexTransport::factory_owned(address, inbound, outbound), operational)
        } else {
            let outbound: Arc<dyn OutboundTransport> = self.build_outbound(&resolved)?;
            let inbound: Arc<dyn InboundTransport> =
                Arc::new(ZmqRouter::empty(address.clone(), self.config.clone()));
            info!("[ZMQ-FACTORY] Remote duplex transport for {} ({})", key, address);
            (DuplexTransport::factory_owned(address, inbound, outbound), true)
        };

        let duplex = Arc::new(duplex);
        if cacheable {
            cache.insert(key, Arc::clone(&duplex));
        }
        Ok(duplex)
    }

    /// A fresh sender that discards everything; never cached
    pub fn build_error(&self) -> Arc<ZmqDealer> {
        Arc::new(ZmqDealer::disabled())
    }

    /// Shut down and forget every cached transport
    pub fn shutdown(&self) {
        let duplexes: Vec<_> = self.duplex.lock().drain().map(|(_, t)| t).collect();
        let inbound: Vec<_> = self.inbound.lock().drain().map(|(_, t)| t).collect();
        let outbound: Vec<_> = self.outbound.lock().drain().map(|(_, t)| t).collect();

        if duplexes.is_empty() && inbound.is_empty() && outbound.is_empty() {
            return;
        }
        info!(
            "[ZMQ-FACTORY] Shutting down {} duplex, {} inbound and {} outbound transports",
            duplexes.len(),
            inbound.len(),
            outbound.len()
        );

        for transport in &duplexes {
            transport.release();
        }
        for transport in &inbound {
            transport.shutdown();
        }
        for transport in &outbound {
            transport.shutdown();
        }
    }
}

impl Drop for ZeroMqTransportFactory {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::LocalPorts;
    use std::time::Duration;

    fn factory(ports: &[u16]) -> ZeroMqTransportFactory {
        let local = Arc::new(LocalPorts::new());
        for port in ports {
            local.register(*port);
        }
        let resolver = Arc::new(AddressResolver::new(local).with_machine_name("node-a"));
        let config = TransportConfig::default()
            .with_poll_timeout(Duration::from_millis(50))
            .with_send_timeout(Duration::from_millis(100));
        ZeroMqTransportFactory::new(resolver, config).unwrap()
    }

    #[test]
    fn test_scheme() {
        assert_eq!(factory(&[]).scheme(), "tcp");
    }

    #[test]
    fn test_outbound_is_cached_by_canonical_uri() {
        let factory = factory(&[]);
        let a = factory
            .build_outbound(&TransportSettings::new("tcp://remote-host:30300/queue"))
            .unwrap();
        let b = factory
            .build_outbound(&TransportSettings::new("zmq://remote-host:30300/queue/extra"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_error_transport_is_never_cached() {
        let factory = factory(&[]);
        let a = factory.build_error();
        let b = factory.build_error();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.address().is_none());
    }

    #[test]
    fn test_remote_duplex_uses_placeholder_inbound() {
        let factory = factory(&[]);
        let duplex = factory
            .build_duplex(&TransportSettings::new("tcp://remote-host:30301/queue"))
            .unwrap();

        assert_eq!(duplex.inbound().transport_type(), "zmq-router-empty");
        assert_eq!(duplex.outbound().transport_type(), "zmq-dealer");
        assert!(!duplex.inbound().is_operational());
    }

    #[test]
    fn test_local_duplex_loops_back() {
        let factory = factory(&[30302]);
        let duplex = factory
            .build_duplex(&TransportSettings::new("tcp://node-a:30302/queue"))
            .unwrap();

        assert_eq!(duplex.inbound().transport_type(), "zmq-router");
        assert_eq!(duplex.outbound().transport_type(), "zmq-loopback");
        assert!(duplex.inbound().is_operational());

        let again = factory
            .build_duplex(&TransportSettings::new("tcp://node-a:30302/queue"))
            .unwrap();
        assert!(Arc::ptr_eq(&duplex, &again));
    }

    #[test]
    fn test_failed_bind_is_not_cached() {
        let factory = factory(&[]);
        let first = factory
            .build_inbound(&TransportSettings::new("tcp://localhost:30303/queue"))
            .unwrap();
        assert!(first.is_operational());

        let other = self::factory(&[]);
        let second = other
            .build_inbound(&TransportSettings::new("tcp://localhost:30303/queue"))
            .unwrap();
        assert!(!second.is_operational());
        let third = other
            .build_inbound(&TransportSettings::new("tcp://localhost:30303/queue"))
            .unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
    }

    #[test]
    fn test_duplex_shutdown_leaves_cached_sender_usable() {
        let factory = factory(&[]);
        let settings = TransportSettings::new("tcp://remote-host:30305/queue");
        let duplex = factory.build_duplex(&settings).unwrap();

        duplex.shutdown();
        assert!(duplex.outbound().is_operational());

        let outbound = factory.build_outbound(&settings).unwrap();
        assert!(outbound.is_operational());
        let again = factory.build_duplex(&settings).unwrap();
        assert!(Arc::ptr_eq(&duplex, &again));
        assert!(again.is_operational());

        factory.shutdown();
        assert!(!outbound.is_operational());
    }

    #[test]
    fn test_standalone_duplex_shuts_down_both_sides() {
        let address = ZeroMqAddress::remote("tcp://localhost:30306/queue").unwrap();
        let config = TransportConfig::default();
        let inbound: Arc<dyn InboundTransport> =
            Arc::new(ZmqRouter::empty(address.clone(), config.clone()));
        let outbound: Arc<dyn OutboundTransport> =
            Arc::new(ZmqDealer::new(zmq::Context::new(), address.clone(), config));
        let duplex = DuplexTransport::new(address, inbound, Arc::clone(&outbound));
        assert!(duplex.is_operational());

        duplex.shutdown();
        assert!(!outbound.is_operational());
        assert!(!duplex.is_operational());
    }

    #[test]
    fn test_shutdown_closes_cached_transports() {
        let factory = factory(&[]);
        let inbound = factory
            .build_inbound(&TransportSettings::new("tcp://localhost:30304/queue"))
            .unwrap();
        assert!(inbound.is_operational());

        factory.shutdown();
        assert!(!inbound.is_operational());
        factory.shutdown();
    }
}
