// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ endpoint addressing
//!
//! Every URI a transport is built for goes through an [`AddressResolver`]. It
//! decides whether the address belongs to this process ("local") and, for
//! local control-channel addresses, swaps the port for a freshly allocated
//! ephemeral one. The result is an immutable [`ZeroMqAddress`] whose identity is
//! its canonical `tcp://host:port/path` URI.
//!
//! ## Example
//!
//! ```
//! use shortbus_transports::address::{AddressResolver, LocalPorts};
//! use std::sync::Arc;
//!
//! let ports = Arc::new(LocalPorts::new());
//! ports.register(5005);
//!
//! let resolver = AddressResolver::new(Arc::clone(&ports)).with_machine_name("node-a");
//! let address = resolver.resolve("tcp://Current:5005/orders")?;
//! assert!(address.is_local());
//! assert_eq!(address.uri(), "tcp://node-a:5005/orders");
//! # Ok::<(), shortbus_transports::TransportError>(())
//! ```

pub mod ports;

pub use ports::{active_tcp_ports, LocalPorts, PortAllocator};

use crate::common::{TransportConfig, TransportError, TransportResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

/// Host token that always means "the machine this process runs on"
pub const CURRENT_MACHINE_ALIAS: &str = "Current";

/// Path segment marking a control-channel address
pub const CONTROL_SEGMENT: &str = "_control";

/// Resolved endpoint address
///
/// Equality and hashing use only the canonical URI.
#[derive(Debug, Clone)]
pub struct ZeroMqAddress {
    raw_uri: String,
    host: String,
    port: u16,
    path: String,
    is_local: bool,
    canonical: String,
}

impl ZeroMqAddress {
    /// Parse `uri` without consulting any local port registry
    pub fn remote(uri: &str) -> TransportResult<Self> {
        let parts = UriParts::parse(uri)?;
        let path = parts.first_segment();
        Ok(Self::build(uri, parts.host, parts.port, path, false))
    }

    fn build(raw_uri: &str, host: String, port: u16, path: String, is_local: bool) -> Self {
        let canonical = format!("tcp://{}:{}/{}", host, port, path);
        Self {
            raw_uri: raw_uri.to_string(),
            host,
            port,
            path,
            is_local,
            canonical,
        }
    }

    /// Canonical `tcp://host:port/path` form
    pub fn uri(&self) -> &str {
        &self.canonical
    }

    /// URI exactly as the caller supplied it
    pub fn raw_uri(&self) -> &str {
        &self.raw_uri
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// First path segment, empty when the URI has none
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Always false: this transport has no transactional delivery
    pub fn is_transactional(&self) -> bool {
        false
    }

    /// Endpoint a ROUTER binds to (all interfaces)
    pub fn bind_endpoint(&self) -> String {
        format!("tcp://*:{}", self.port)
    }

    /// Endpoint a DEALER connects to (path dropped)
    pub fn connect_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl PartialEq for ZeroMqAddress {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for ZeroMqAddress {}

impl Hash for ZeroMqAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for ZeroMqAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Turns raw URIs into [`ZeroMqAddress`]es for one process
#[derive(Debug, Clone)]
pub struct AddressResolver {
    local_ports: Arc<LocalPorts>,
    machine_name: String,
    allocator: PortAllocator,
}

impl AddressResolver {
    pub fn new(local_ports: Arc<LocalPorts>) -> Self {
        Self {
            local_ports,
            machine_name: local_machine_name(),
            allocator: PortAllocator::default(),
        }
    }

    /// Resolver using the port range and probe budget from `config`
    pub fn from_config(local_ports: Arc<LocalPorts>, config: &TransportConfig) -> Self {
        Self::new(local_ports).with_allocator(PortAllocator::new(
            config.ephemeral_ports,
            config.port_probe_attempts,
        ))
    }

    /// Override the detected machine name
    pub fn with_machine_name(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = machine_name.into();
        self
    }

    pub fn with_allocator(mut self, allocator: PortAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    pub fn local_ports(&self) -> &Arc<LocalPorts> {
        &self.local_ports
    }

    pub fn allocator(&self) -> &PortAllocator {
        &self.allocator
    }

    pub fn register_local_port(&self, port: u16) {
        self.local_ports.register(port);
    }

    /// True for the current-machine alias or this machine's name, ignoring case
    pub fn is_local_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        host == CURRENT_MACHINE_ALIAS.to_lowercase() || host == self.machine_name.to_lowercase()
    }

    /// Resolve `uri`, allocating a fresh port for local control channels
    ///
    /// # Errors
    ///
    /// `InvalidAddress` when the URI lacks a host or port, `PortExhausted`
    /// when a control channel needs a port and none is free. Both are safe to
    /// retry.
    pub fn resolve(&self, uri: &str) -> TransportResult<ZeroMqAddress> {
        info!("[ZMQ-ADDRESS] Creating ZMQ address from {}", uri);
        let parts = UriParts::parse(uri)?;
        let path = parts.first_segment();

        let is_local = self.local_ports.contains(parts.port) && self.is_local_host(&parts.host);
        if !is_local {
            return Ok(ZeroMqAddress::build(uri, parts.host, parts.port, path, false));
        }

        let host = self.machine_name.clone();
        if parts.has_segment(CONTROL_SEGMENT) {
            let port = self.allocator.allocate()?;
            self.local_ports.register(port);
            debug!(
                "[ZMQ-ADDRESS] Control channel {} remapped from port {} to {}",
                uri, parts.port, port
            );
            return Ok(ZeroMqAddress::build(uri, host, port, path, true));
        }

        Ok(ZeroMqAddress::build(uri, host, parts.port, path, true))
    }
}

/// Best-effort name of the machine this process runs on
pub fn local_machine_name() -> String {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(name) = std::env::var(var) {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    for file in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
        if let Ok(name) = std::fs::read_to_string(file) {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    "localhost".to_string()
}

struct UriParts {
    host: String,
    port: u16,
    segments: Vec<String>,
}

impl UriParts {
    fn parse(uri: &str) -> TransportResult<Self> {
        let invalid = |reason: &str| TransportError::InvalidAddress(format!("{}: {}", uri, reason));

        let (scheme, rest) = uri.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        if scheme.is_empty() {
            return Err(invalid("missing scheme"));
        }

        let rest = rest.split(|c| c == '?' || c == '#').next().unwrap_or_default();
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        let authority = authority.rsplit('@').next().unwrap_or(authority);

        let (host, port) = authority.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    fn first_segment(&self) -> String {
        self.segments.first().cloned().unwrap_or_default()
    }

    fn has_segment(&self, segment: &str) -> bool {
        let segment = segment.to_lowercase();
        self.segments.iter().any(|s| s.to_lowercase() == segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn resolver_with(ports: &[u16]) -> AddressResolver {
        let local = Arc::new(LocalPorts::new());
        for p in ports {
            local.register(*p);
        }
        AddressResolver::new(local).with_machine_name("BuildBox")
    }

    #[test]
    fn test_parse_components() {
        let address = ZeroMqAddress::remote("tcp://somehost:5005/orders/extra").unwrap();
        assert_eq!(address.host(), "somehost");
        assert_eq!(address.port(), 5005);
        assert_eq!(address.path(), "orders");
        assert!(!address.is_local());
        assert!(!address.is_transactional());
        assert_eq!(address.raw_uri(), "tcp://somehost:5005/orders/extra");
        assert_eq!(address.uri(), "tcp://somehost:5005/orders");
    }

    #[test]
    fn test_missing_path_yields_empty_path() {
        let address = ZeroMqAddress::remote("tcp://somehost:5005").unwrap();
        assert_eq!(address.path(), "");
        assert_eq!(address.uri(), "tcp://somehost:5005/");

        let address = ZeroMqAddress::remote("tcp://somehost:5005/").unwrap();
        assert_eq!(address.path(), "");
    }

    #[test]
    fn test_canonical_scheme_is_tcp() {
        let address = ZeroMqAddress::remote("zmq://somehost:5005/q").unwrap();
        assert_eq!(address.uri(), "tcp://somehost:5005/q");
    }

    #[test]
    fn test_invalid_uris() {
        for uri in ["somehost:5005", "tcp://somehost", "tcp://:5005/", "tcp://host:notaport/", "tcp://host:70000/"] {
            assert!(
                matches!(ZeroMqAddress::remote(uri), Err(TransportError::InvalidAddress(_))),
                "{} should be rejected",
                uri
            );
        }
    }

    #[test]
    fn test_equality_uses_canonical_uri() {
        let a = ZeroMqAddress::remote("tcp://host:1234/queue/").unwrap();
        let b = ZeroMqAddress::remote("zmq://host:1234/queue").unwrap();
        assert_ne!(a.raw_uri(), b.raw_uri());
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_endpoints() {
        let address = ZeroMqAddress::remote("tcp://host:1234/queue").unwrap();
        assert_eq!(address.bind_endpoint(), "tcp://*:1234");
        assert_eq!(address.connect_endpoint(), "tcp://host:1234");
    }

    #[test]
    fn test_locality_requires_registered_port_and_local_host() {
        let resolver = resolver_with(&[5005]);

        let current = resolver.resolve("tcp://current:5005/q").unwrap();
        assert!(current.is_local());
        assert_eq!(current.host(), "BuildBox");

        let named = resolver.resolve("tcp://buildbox:5005/q").unwrap();
        assert!(named.is_local());

        let other_port = resolver.resolve("tcp://Current:5006/q").unwrap();
        assert!(!other_port.is_local());

        let other_host = resolver.resolve("tcp://elsewhere:5005/q").unwrap();
        assert!(!other_host.is_local());
        assert_eq!(other_host.uri(), "tcp://elsewhere:5005/q");
    }

    #[test]
    fn test_control_channel_gets_fresh_port() {
        let resolver = resolver_with(&[5005]);

        let first = resolver.resolve("tcp://Current:5005/_control").unwrap();
        assert!(first.is_local());
        assert_eq!(first.host(), "BuildBox");
        assert_ne!(first.port(), 5005);
        assert!((10000..20000).contains(&first.port()));
        assert!(resolver.local_ports().contains(first.port()));
        assert_eq!(first.uri(), format!("tcp://BuildBox:{}/_control", first.port()));

        let second = resolver.resolve("tcp://Current:5005/_control").unwrap();
        assert_ne!(first.port(), second.port());
    }

    #[test]
    fn test_control_segment_is_case_insensitive() {
        let resolver = resolver_with(&[5005]);
        let address = resolver.resolve("tcp://Current:5005/process/_CONTROL").unwrap();
        assert_ne!(address.port(), 5005);
        assert_eq!(address.path(), "process");
    }

    #[test]
    fn test_remote_control_keeps_port() {
        let resolver = resolver_with(&[5005]);
        let address = resolver.resolve("tcp://elsewhere:5005/_control").unwrap();
        assert!(!address.is_local());
        assert_eq!(address.port(), 5005);
    }

    #[test]
    fn test_control_port_exhaustion_surfaces() {
        let local = Arc::new(LocalPorts::new());
        local.register(5005);
        // A one-port range whose only port is held open by this test
        let listener = std::net::TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let held = listener.local_addr().unwrap().port();
        let resolver = AddressResolver::new(local)
            .with_machine_name("BuildBox")
            .with_allocator(PortAllocator::new(
                crate::common::PortRange::new(held, held + 1),
                5,
            ));

        let result = resolver.resolve("tcp://Current:5005/_control");
        assert!(matches!(result, Err(TransportError::PortExhausted { .. })));
    }

    proptest! {
        #[test]
        fn prop_locality_rule(port in 1u16..u16::MAX, registered in proptest::bool::ANY, host_kind in 0u8..3) {
            let resolver = if registered { resolver_with(&[port]) } else { resolver_with(&[]) };
            let host = match host_kind {
                0 => "CURRENT",
                1 => "buildBOX",
                _ => "some-other-host",
            };
            let address = resolver.resolve(&format!("tcp://{}:{}/queue", host, port)).unwrap();
            prop_assert_eq!(address.is_local(), registered && host_kind < 2);
            prop_assert_eq!(address.port(), port);
        }
    }
}
