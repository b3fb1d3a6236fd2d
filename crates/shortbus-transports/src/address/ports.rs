// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-local port registry and ephemeral port allocation
//!
//! Allocation is best effort: the active-connection snapshot and the bind probe
//! are not atomic with the later bind, so two allocators on the same host can
//! race for one port. Callers treat a failed bind as a reason to resolve again.

use crate::common::{PortRange, TransportError, TransportResult};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use tracing::{debug, info};

/// Ports that belong to this process
///
/// Grows for the life of the registry; there is no removal path. Shared between
/// every resolver and host in the process via `Arc`.
#[derive(Debug, Default)]
pub struct LocalPorts {
    ports: RwLock<HashSet<u16>>,
}

impl LocalPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `port` as local to this process
    pub fn register(&self, port: u16) {
        let mut ports = self.ports.write();
        if ports.insert(port) {
            info!(
                "[ZMQ-ADDRESS] Registering {} as a local port. We now have {} ports local to the process",
                port,
                ports.len()
            );
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.read().contains(&port)
    }

    pub fn len(&self) -> usize {
        self.ports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.ports.read().iter().copied().collect();
        ports.sort_unstable();
        ports
    }
}

/// Draws random ports from a range, skipping any already in use on this host
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: PortRange,
    max_attempts: u32,
}

impl PortAllocator {
    pub fn new(range: PortRange, max_attempts: u32) -> Self {
        Self {
            range,
            max_attempts,
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Find a port nobody on this host is using
    pub fn allocate(&self) -> TransportResult<u16> {
        let active = active_tcp_ports();
        self.allocate_with(|port| !active.contains(&port) && can_bind(port))
    }

    /// Find a port in range accepted by `is_free`
    pub fn allocate_with<F>(&self, mut is_free: F) -> TransportResult<u16>
    where
        F: FnMut(u16) -> bool,
    {
        if self.range.start >= self.range.end {
            return Err(TransportError::InvalidConfig(format!(
                "ephemeral port range {}..{} is empty",
                self.range.start, self.range.end
            )));
        }

        let mut rng = rand::thread_rng();
        for _ in 0..self.max_attempts {
            let port = rng.gen_range(self.range.start..self.range.end);
            if is_free(port) {
                debug!("[ZMQ-ADDRESS] Allocated ephemeral port {}", port);
                return Ok(port);
            }
        }

        Err(TransportError::PortExhausted {
            attempts: self.max_attempts,
            start: self.range.start,
            end: self.range.end,
        })
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(PortRange::default(), 1000)
    }
}

fn can_bind(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// Local ports of every TCP socket the kernel currently knows about
///
/// Read from `/proc/net/tcp{,6}`; empty where those do not exist, leaving the
/// bind probe as the only check.
pub fn active_tcp_ports() -> HashSet<u16> {
    let mut ports = HashSet::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(contents) = std::fs::read_to_string(table) {
            ports.extend(parse_proc_net_tcp(&contents));
        }
    }
    ports
}

fn parse_proc_net_tcp(contents: &str) -> impl Iterator<Item = u16> + '_ {
    // sl local_address rem_address st ...; local_address is HEXIP:HEXPORT
    contents.lines().skip(1).filter_map(|line| {
        let local = line.split_whitespace().nth(1)?;
        let (_, port) = local.rsplit_once(':')?;
        u16::from_str_radix(port, 16).ok()
    })
}
