// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Loopback sender
//!
//! Sends to a local address never touch the network: the envelope is encoded
//! and pushed straight into the inbound transport's hand-off queue.

use crate::address::ZeroMqAddress;
use crate::common::stats::{add, bump, OutboundCounters};
use crate::common::{OutboundStats, SendContext, TransportResult};
use crate::traits::{InboundTransport, OutboundTransport, Transport};
use std::sync::Arc;
use tracing::debug;

pub struct LoopbackSender {
    inbound: Arc<dyn InboundTransport>,
    counters: OutboundCounters,
}

impl LoopbackSender {
    pub fn new(inbound: Arc<dyn InboundTransport>) -> Self {
        Self {
            inbound,
            counters: OutboundCounters::default(),
        }
    }

    pub fn inbound(&self) -> &Arc<dyn InboundTransport> {
        &self.inbound
    }

    pub fn stats(&self) -> OutboundStats {
        self.counters.snapshot()
    }
}

impl Transport for LoopbackSender {
    fn address(&self) -> Option<&ZeroMqAddress> {
        self.inbound.address()
    }

    fn is_operational(&self) -> bool {
        self.inbound.is_operational()
    }

    /// The inbound side is owned by the factory and shut down there
    fn shutdown(&self) {}

    fn transport_type(&self) -> &str {
        "zmq-loopback"
    }
}

impl OutboundTransport for LoopbackSender {
    fn send(&self, context: &dyn SendContext) -> TransportResult<()> {
        let frame = context.to_envelope()?.encode()?;
        let len = frame.len();
        let destination = self.address().map(|a| a.to_string()).unwrap_or_default();

        if !self.inbound.inject(frame) {
            bump(&self.counters.messages_dropped);
            debug!(
                "[ZMQ-LOOPBACK] {} is closed. Dropping message {}",
                destination,
                context.message_id()
            );
            return Ok(());
        }

        bump(&self.counters.messages_queued);
        bump(&self.counters.messages_sent);
        add(&self.counters.bytes_sent, len);
        debug!("[ZMQ-LOOPBACK] Message {} injected into {}", context.message_id(), destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{handler, MessageHandler, OutboundMessage, ReceiveContext, TransportConfig};
    use crate::traits::ReceiveOutcome;
    use crate::zmq::ZmqRouter;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_loopback_delivers_in_order() {
        let address = ZeroMqAddress::remote("tcp://localhost:30200/loop").unwrap();
        let inbound: Arc<dyn InboundTransport> =
            Arc::new(ZmqRouter::empty(address.clone(), TransportConfig::default()));
        let sender = LoopbackSender::new(Arc::clone(&inbound));
        assert_eq!(sender.address(), Some(&address));

        for i in 0..5 {
            sender
                .send(&OutboundMessage::new("text/plain", i.to_string(), vec![i as u8]))
                .unwrap();
        }

        let next = Rc::new(Cell::new(0u8));
        for _ in 0..5 {
            let expected = Rc::clone(&next);
            let resolver = move |_: &ReceiveContext| -> Option<MessageHandler> {
                let expected = Rc::clone(&expected);
                Some(handler(move |ctx| {
                    assert_eq!(ctx.body(), &[expected.get()]);
                    expected.set(expected.get() + 1);
                }))
            };
            assert_eq!(
                inbound.receive(&resolver, Duration::from_millis(100)),
                ReceiveOutcome::Dispatched
            );
        }
        assert_eq!(next.get(), 5);
        assert_eq!(sender.stats().messages_sent, 5);
    }

    #[test]
    fn test_sends_past_queue_capacity_return() {
        let address = ZeroMqAddress::remote("tcp://localhost:30201/loop").unwrap();
        let config = TransportConfig::default().with_handoff_capacity(2);
        let inbound: Arc<dyn InboundTransport> = Arc::new(ZmqRouter::empty(address, config));
        let sender = Arc::new(LoopbackSender::new(Arc::clone(&inbound)));

        let (done_tx, done_rx) = crossbeam::channel::bounded(1);
        let producer = Arc::clone(&sender);
        std::thread::spawn(move || {
            for i in 0..3u8 {
                producer
                    .send(&OutboundMessage::new("text/plain", i.to_string(), vec![i]))
                    .unwrap();
            }
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert_eq!(sender.stats().messages_sent, 3);
    }

    #[test]
    fn test_handler_can_send_to_own_address() {
        let address = ZeroMqAddress::remote("tcp://localhost:30202/loop").unwrap();
        let config = TransportConfig::default().with_handoff_capacity(1);
        let inbound: Arc<dyn InboundTransport> = Arc::new(ZmqRouter::empty(address, config));
        let sender = Rc::new(LoopbackSender::new(Arc::clone(&inbound)));

        sender
            .send(&OutboundMessage::new("text/plain", "first", Vec::new()))
            .unwrap();

        // Replies while the queue is at capacity
        let replier = Rc::clone(&sender);
        let resolver = move |_: &ReceiveContext| -> Option<MessageHandler> {
            let replier = Rc::clone(&replier);
            Some(handler(move |ctx| {
                if ctx.message_id() == "first" {
                    for id in ["reply-1", "reply-2"] {
                        replier
                            .send(&OutboundMessage::new("text/plain", id, Vec::new()))
                            .unwrap();
                    }
                }
            }))
        };
        assert_eq!(
            inbound.receive(&resolver, Duration::from_millis(100)),
            ReceiveOutcome::Dispatched
        );
        assert_eq!(sender.stats().messages_sent, 3);
    }

    #[test]
    fn test_send_to_closed_inbound_counts_drop() {
        let address = ZeroMqAddress::remote("tcp://localhost:30203/loop").unwrap();
        let inbound: Arc<dyn InboundTransport> =
            Arc::new(ZmqRouter::empty(address, TransportConfig::default()));
        let sender = LoopbackSender::new(Arc::clone(&inbound));

        inbound.shutdown();
        sender
            .send(&OutboundMessage::new("text/plain", "late", b"x".to_vec()))
            .unwrap();

        let stats = sender.stats();
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.messages_dropped, 1);
    }
}
