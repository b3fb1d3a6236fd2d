// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport trait definitions
//!
//! These traits define the interface the bus pipeline programs against. Real
//! sockets, loopback injectors and disabled placeholders all implement them, so
//! a duplex transport can pair any inbound side with any outbound side.

use crate::address::ZeroMqAddress;
use crate::common::{DispatchResolver, InboundStats, OutboundStats, SendContext, TransportResult};
use std::time::Duration;

/// Base transport trait - implemented by all transports
pub trait Transport: Send + Sync {
    /// Address this transport receives on or sends to (None for disabled senders)
    fn address(&self) -> Option<&ZeroMqAddress>;

    /// Whether the transport can currently move messages
    fn is_operational(&self) -> bool;

    /// Stop background work and release sockets; safe to call repeatedly
    fn shutdown(&self);

    /// Get transport name/type
    fn transport_type(&self) -> &str;
}

/// What a single `receive` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Nothing arrived within the timeout
    Idle,
    /// A handler was resolved and ran on the calling thread
    Dispatched,
    /// A frame was taken from the queue and discarded
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Bytes did not decode as an envelope
    Corrupt,
    /// The dispatch resolver produced no handler
    NoHandler,
}

/// Receiving side of a transport
pub trait InboundTransport: Transport {
    /// Take at most one message, waiting up to `timeout`, and dispatch it
    fn receive(&self, resolver: &dyn DispatchResolver, timeout: Duration) -> ReceiveOutcome;

    /// Queue raw envelope bytes for `receive`, bypassing the network
    ///
    /// Never blocks. Returns false when the frame was discarded because the
    /// transport is closed.
    fn inject(&self, frame: Vec<u8>) -> bool;
}

/// Sending side of a transport
pub trait OutboundTransport: Transport {
    /// Envelope and queue a message for delivery
    ///
    /// Returns once the message is queued; delivery failures are not reported
    /// here. Errors only when the payload cannot be serialized or is too large.
    fn send(&self, context: &dyn SendContext) -> TransportResult<()>;
}

/// Statistics tracking
///
/// For monitoring transport traffic and silent drops.
pub trait TransportStats {
    /// Get total messages sent
    fn messages_sent(&self) -> u64;

    /// Get total messages received
    fn messages_received(&self) -> u64;

    /// Get total messages dropped without delivery
    fn messages_dropped(&self) -> u64;

    /// Get error count
    fn error_count(&self) -> u64;
}

impl TransportStats for InboundStats {
    fn messages_sent(&self) -> u64 {
        0
    }

    fn messages_received(&self) -> u64 {
        self.frames_received
    }

    fn messages_dropped(&self) -> u64 {
        self.dropped()
    }

    fn error_count(&self) -> u64 {
        self.corrupt_envelopes
    }
}

impl TransportStats for OutboundStats {
    fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    fn messages_received(&self) -> u64 {
        0
    }

    fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }

    fn error_count(&self) -> u64 {
        self.send_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(stats: &dyn TransportStats) -> (u64, u64, u64, u64) {
        (
            stats.messages_sent(),
            stats.messages_received(),
            stats.messages_dropped(),
            stats.error_count(),
        )
    }

    #[test]
    fn test_inbound_stats_through_trait() {
        let stats = InboundStats {
            frames_received: 10,
            bytes_received: 640,
            undersized_frames: 1,
            corrupt_envelopes: 2,
            unrouted_messages: 3,
            dispatched_messages: 4,
        };
        assert_eq!(totals(&stats), (0, 10, 6, 2));
    }

    #[test]
    fn test_outbound_stats_through_trait() {
        let stats = OutboundStats {
            messages_queued: 7,
            messages_sent: 5,
            bytes_sent: 320,
            messages_dropped: 1,
            send_errors: 2,
        };
        assert_eq!(totals(&stats), (5, 0, 1, 2));
    }
}
