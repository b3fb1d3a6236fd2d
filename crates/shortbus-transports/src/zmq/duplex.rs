// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Paired inbound and outbound transports sharing one address

use crate::address::ZeroMqAddress;
use crate::common::{DispatchResolver, SendContext, TransportResult};
use crate::traits::{InboundTransport, OutboundTransport, ReceiveOutcome, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One address, two directions
///
/// For a local address the outbound side is a loopback into the inbound side;
/// for a remote one the inbound side is an empty placeholder.
pub struct DuplexTransport {
    address: ZeroMqAddress,
    inbound: Arc<dyn InboundTransport>,
    outbound: Arc<dyn OutboundTransport>,
    factory_owned: bool,
}

impl DuplexTransport {
    /// Pair two transports; shutting the pair down shuts both down
    pub fn new(
        address: ZeroMqAddress,
        inbound: Arc<dyn InboundTransport>,
        outbound: Arc<dyn OutboundTransport>,
    ) -> Self {
        Self {
            address,
            inbound,
            outbound,
            factory_owned: false,
        }
    }

    /// Pair whose sides are cached by a factory and only released by it
    pub(crate) fn factory_owned(
        address: ZeroMqAddress,
        inbound: Arc<dyn InboundTransport>,
        outbound: Arc<dyn OutboundTransport>,
    ) -> Self {
        Self {
            factory_owned: true,
            ..Self::new(address, inbound, outbound)
        }
    }

    /// Shut down both sides regardless of ownership
    pub(crate) fn release(&self) {
        self.outbound.shutdown();
        self.inbound.shutdown();
    }

    /// Same as [`Transport::address`], without the `Option`
    pub fn endpoint_address(&self) -> &ZeroMqAddress {
        &self.address
    }

    pub fn inbound(&self) -> &Arc<dyn InboundTransport> {
        &self.inbound
    }

    pub fn outbound(&self) -> &Arc<dyn OutboundTransport> {
        &self.outbound
    }
}

impl Transport for DuplexTransport {
    fn address(&self) -> Option<&ZeroMqAddress> {
        Some(&self.address)
    }

    fn is_operational(&self) -> bool {
        self.outbound.is_operational() || self.inbound.is_operational()
    }

    fn shutdown(&self) {
        if self.factory_owned {
            debug!(
                "[ZMQ-DUPLEX] {} is owned by its factory, leaving shutdown to it",
                self.address
            );
            return;
        }
        self.release();
    }

    fn transport_type(&self) -> &str {
        "zmq-duplex"
    }
}

impl InboundTransport for DuplexTransport {
    fn receive(&self, resolver: &dyn DispatchResolver, timeout: Duration) -> ReceiveOutcome {
        self.inbound.receive(resolver, timeout)
    }

    fn inject(&self, frame: Vec<u8>) -> bool {
        self.inbound.inject(frame)
    }
}

impl OutboundTransport for DuplexTransport {
    fn send(&self, context: &dyn SendContext) -> TransportResult<()> {
        self.outbound.send(context)
    }
}
