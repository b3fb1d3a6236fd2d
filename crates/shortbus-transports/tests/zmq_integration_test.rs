// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for ZMQ inbound/outbound pairs and the transport factory

use shortbus_transports::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

type Received = (String, String, Vec<u8>);

fn test_config() -> TransportConfig {
    TransportConfig::default()
        .with_poll_timeout(Duration::from_millis(50))
        .with_send_timeout(Duration::from_millis(500))
        .with_shutdown_timeouts(Duration::from_secs(1), Duration::from_secs(2))
}

fn address(uri: &str) -> ZeroMqAddress {
    ZeroMqAddress::remote(uri).unwrap()
}

/// Receive one message and hand back what the handler saw
fn receive_one<T: InboundTransport + ?Sized>(inbound: &T, timeout: Duration) -> Option<Received> {
    let seen: Rc<RefCell<Option<Received>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let resolver = move |_: &ReceiveContext| -> Option<MessageHandler> {
        let sink = Rc::clone(&sink);
        Some(handler(move |ctx| {
            let id = ctx.message_id().to_string();
            let content_type = ctx.content_type().to_string();
            *sink.borrow_mut() = Some((id, content_type, ctx.into_body()));
        }))
    };

    match inbound.receive(&resolver, timeout) {
        ReceiveOutcome::Dispatched => seen.borrow_mut().take(),
        _ => None,
    }
}

fn factory_for(machine: &str, local_ports: &[u16]) -> ZeroMqTransportFactory {
    let ports = Arc::new(LocalPorts::new());
    for port in local_ports {
        ports.register(*port);
    }
    let resolver = Arc::new(AddressResolver::new(ports).with_machine_name(machine));
    ZeroMqTransportFactory::new(resolver, test_config()).unwrap()
}

/// N sends from one DEALER arrive at the ROUTER in submission order
#[test]
fn test_dealer_to_router_preserves_order() {
    const COUNT: usize = 50;

    let inbound = ZmqRouter::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31000/orders"),
        test_config(),
    );
    assert!(inbound.is_operational());

    let outbound = ZmqDealer::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31000/orders"),
        test_config(),
    );
    for i in 0..COUNT {
        let message = OutboundMessage::new("text/plain", format!("msg-{}", i), vec![i as u8; 8]);
        outbound.send(&message).unwrap();
    }

    for i in 0..COUNT {
        let (id, _, body) = receive_one(&inbound, Duration::from_secs(5))
            .unwrap_or_else(|| panic!("message {} never arrived", i));
        assert_eq!(id, format!("msg-{}", i));
        assert_eq!(body, vec![i as u8; 8]);
    }

    assert_eq!(inbound.stats().dispatched_messages, COUNT as u64);
    outbound.shutdown();
    inbound.shutdown();
}

/// Content type, id and a 42 byte body survive the trip over real sockets
#[test]
fn test_envelope_fields_over_the_wire() {
    let inbound = ZmqRouter::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31001/orders"),
        test_config(),
    );
    let outbound = ZmqDealer::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31001/orders"),
        test_config(),
    );

    let body: Vec<u8> = (0..42).collect();
    outbound
        .send(&OutboundMessage::new("application/json", "abc-123", body.clone()))
        .unwrap();

    let (id, content_type, received) = receive_one(&inbound, Duration::from_secs(5)).unwrap();
    assert_eq!(id, "abc-123");
    assert_eq!(content_type, "application/json");
    assert_eq!(received.len(), 42);
    assert_eq!(received, body);
}

/// Many producer threads share one outbound transport
#[test]
fn test_concurrent_senders() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;

    let inbound = ZmqRouter::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31002/orders"),
        test_config(),
    );
    let outbound = Arc::new(ZmqDealer::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31002/orders"),
        test_config(),
    ));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let outbound = Arc::clone(&outbound);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let message =
                        OutboundMessage::new("text/plain", format!("{}-{}", t, i), vec![t as u8]);
                    outbound.send(&message).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut last_seen = vec![None::<usize>; THREADS];
    for _ in 0..THREADS * PER_THREAD {
        let (id, _, _) = receive_one(&inbound, Duration::from_secs(5)).unwrap();
        let (t, i) = id.split_once('-').unwrap();
        let (t, i): (usize, usize) = (t.parse().unwrap(), i.parse().unwrap());
        // Each producer's messages stay in order
        if let Some(previous) = last_seen[t] {
            assert!(i > previous);
        }
        last_seen[t] = Some(i);
    }

    assert_eq!(outbound.stats().messages_queued, (THREADS * PER_THREAD) as u64);
}

#[test]
fn test_zero_timeout_returns_promptly() {
    let inbound = ZmqRouter::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31003/orders"),
        test_config(),
    );

    let start = Instant::now();
    assert!(receive_one(&inbound, Duration::ZERO).is_none());
    assert!(receive_one(&inbound, Duration::from_millis(1)).is_none());
    assert!(start.elapsed() < Duration::from_millis(500));
}

/// Undersized and corrupt frames never reach a handler
#[test]
fn test_garbage_frames_are_dropped() {
    let inbound = ZmqRouter::new(
        zmq::Context::new(),
        address("tcp://127.0.0.1:31004/orders"),
        test_config(),
    );

    let context = zmq::Context::new();
    let raw = context.socket(zmq::DEALER).unwrap();
    raw.set_linger(0).unwrap();
    raw.connect("tcp://127.0.0.1:31004").unwrap();
    raw.send(&b"tiny"[..], 0).unwrap();
    raw.send(&[0xFFu8; 64][..], 0).unwrap();
    let valid = Envelope::new("text/plain", "ok", b"fine".to_vec()).encode().unwrap();
    raw.send(valid.as_slice(), 0).unwrap();

    // The undersized frame never reaches the queue; the corrupt one is dropped on receive
    let on_any = |_: &ReceiveContext| -> Option<MessageHandler> { Some(handler(|_| {})) };
    assert_eq!(
        inbound.receive(&on_any, Duration::from_secs(5)),
        ReceiveOutcome::Dropped(DropReason::Corrupt)
    );
    let (id, _, _) = receive_one(&inbound, Duration::from_secs(5)).unwrap();
    assert_eq!(id, "ok");

    let stats = inbound.stats();
    assert_eq!(stats.undersized_frames, 1);
    assert_eq!(stats.corrupt_envelopes, 1);
    assert_eq!(stats.dropped(), 2);
}

#[test]
fn test_duplex_is_cached_per_uri() {
    let factory = factory_for("node-a", &[31005]);
    let settings = TransportSettings::new("tcp://Current:31005/orders");

    let first = factory.build_duplex(&settings).unwrap();
    let second = factory.build_duplex(&settings).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.address().unwrap().uri(), "tcp://node-a:31005/orders");
}

/// Concurrent first requests build exactly one transport
#[test]
fn test_concurrent_duplex_construction() {
    const THREADS: usize = 8;

    let factory = Arc::new(factory_for("node-a", &[31006]));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let factory = Arc::clone(&factory);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                factory
                    .build_duplex(&TransportSettings::new("tcp://node-a:31006/orders"))
                    .unwrap()
            })
        })
        .collect();

    let built: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for duplex in &built[1..] {
        assert!(Arc::ptr_eq(&built[0], duplex));
    }
    assert!(built[0].inbound().is_operational());
}

#[test]
fn test_loopback_delivers_to_self() {
    let factory = factory_for("node-a", &[31007]);
    let duplex = factory
        .build_duplex(&TransportSettings::new("tcp://node-a:31007/orders"))
        .unwrap();
    assert_eq!(duplex.outbound().transport_type(), "zmq-loopback");

    let body = vec![7u8; 42];
    duplex
        .send(&OutboundMessage::new("application/json", "abc-123", body.clone()))
        .unwrap();

    let (id, content_type, received) = receive_one(duplex.as_ref(), Duration::from_secs(1)).unwrap();
    assert_eq!(id, "abc-123");
    assert_eq!(content_type, "application/json");
    assert_eq!(received, body);
}

/// Control channels get a fresh ephemeral port on every request
#[test]
fn test_control_channel_duplexes_use_fresh_ports() {
    let factory = factory_for("node-a", &[31008]);

    let first = factory
        .build_duplex(&TransportSettings::new("tcp://Current:31008/orders/_control"))
        .unwrap();
    let port = first.address().unwrap().port();
    assert_ne!(port, 31008);
    assert!((10000..20000).contains(&port));
    assert!(factory.resolver().local_ports().contains(port));
    assert!(first.inbound().is_operational());

    // Same requested URI hits the duplex cache
    let again = factory
        .build_duplex(&TransportSettings::new("tcp://Current:31008/orders/_control"))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    // A fresh resolution allocates another port
    let resolved = factory
        .resolver()
        .resolve("tcp://Current:31008/orders/_control")
        .unwrap();
    assert_ne!(resolved.port(), port);
}

#[test]
fn test_outbound_to_unreachable_address_does_not_block() {
    let factory = factory_for("node-a", &[]);

    let start = Instant::now();
    let outbound = factory
        .build_outbound(&TransportSettings::new("tcp://203.0.113.1:31009/nowhere"))
        .unwrap();
    outbound
        .send(&OutboundMessage::new("text/plain", "m", b"x".to_vec()))
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(outbound.is_operational());
}

#[test]
fn test_error_transport_discards_sends() {
    let factory = factory_for("node-a", &[]);
    let error = factory.build_error();

    assert!(error.address().is_none());
    error
        .send(&OutboundMessage::new("text/plain", "lost", b"x".to_vec()))
        .unwrap();
    assert_eq!(error.stats().messages_dropped, 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let factory = factory_for("node-a", &[31010]);
    let duplex = factory
        .build_duplex(&TransportSettings::new("tcp://node-a:31010/orders"))
        .unwrap();
    let outbound = factory
        .build_outbound(&TransportSettings::new("tcp://127.0.0.1:31011/orders"))
        .unwrap();

    duplex.shutdown();
    duplex.shutdown();
    factory.shutdown();
    factory.shutdown();

    assert!(!duplex.inbound().is_operational());
    assert!(!outbound.is_operational());
}
