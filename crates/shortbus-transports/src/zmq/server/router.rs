// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ ROUTER inbound transport
//!
//! A ROUTER socket accepts frames from any number of DEALER peers. A dedicated
//! receive loop owns the socket, polls it with a short timeout so shutdown is
//! noticed promptly, and pushes every plausible frame onto a bounded hand-off
//! queue. Injected (loopback) frames take a separate unbounded lane, so a
//! sender never waits on a consumer that may be itself. Consumers drain both
//! through [`InboundTransport::receive`], which decodes the envelope and
//! dispatches it on the caller's thread.

use crate::address::ZeroMqAddress;
use crate::common::stats::{add, bump, InboundCounters};
use crate::common::{
    DispatchResolver, InboundStats, ReceiveContext, TransportConfig, TransportError,
    TransportResult,
};
use crate::envelope::Envelope;
use crate::traits::{DropReason, InboundTransport, ReceiveOutcome, Transport};
use crate::zmq::log_message_body;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of an inbound transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundState {
    /// No socket (empty variant, or bind failed)
    Unbound,
    Binding,
    Listening,
    /// Shutdown requested, waiting for the receive loop
    Draining,
    Closed,
}

/// ZMQ ROUTER socket implementation (receiver)
pub struct ZmqRouter {
    address: ZeroMqAddress,
    config: TransportConfig,
    handoff_tx: Sender<Vec<u8>>,
    handoff_rx: Receiver<Vec<u8>>,
    injected_tx: Sender<Vec<u8>>,
    injected_rx: Receiver<Vec<u8>>,
    state: Mutex<InboundState>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<ReceiveWorker>>,
    context: Mutex<Option<zmq::Context>>,
    counters: Arc<InboundCounters>,
    empty: bool,
}

struct ReceiveWorker {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl ZmqRouter {
    /// Create a ROUTER bound to `address` and start its receive loop
    ///
    /// A bind failure is logged and leaves the transport non-operational; check
    /// [`Transport::is_operational`] before relying on it.
    pub fn new(context: zmq::Context, address: ZeroMqAddress, config: TransportConfig) -> Self {
        let router = Self::unbound(address, config, Some(context), false);
        if let Err(e) = router.start() {
            error!(
                "[ZMQ-ROUTER] Failed to bind {} ({}): {}",
                router.address,
                router.address.bind_endpoint(),
                e
            );
            *router.context.lock() = None;
            *router.state.lock() = InboundState::Unbound;
        }
        router
    }

    /// Create a receiver with a hand-off queue but no socket
    ///
    /// Injected frames are delivered normally; nothing arrives from the network.
    pub fn empty(address: ZeroMqAddress, config: TransportConfig) -> Self {
        info!("[ZMQ-ROUTER] Creating an empty receive transport for {}", address);
        Self::unbound(address, config, None, true)
    }

    fn unbound(
        address: ZeroMqAddress,
        config: TransportConfig,
        context: Option<zmq::Context>,
        empty: bool,
    ) -> Self {
        let (handoff_tx, handoff_rx) = channel::bounded(config.handoff_capacity.max(1));
        let (injected_tx, injected_rx) = channel::unbounded();
        Self {
            address,
            config,
            handoff_tx,
            handoff_rx,
            injected_tx,
            injected_rx,
            state: Mutex::new(InboundState::Unbound),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            context: Mutex::new(context),
            counters: Arc::new(InboundCounters::default()),
            empty,
        }
    }

    fn start(&self) -> TransportResult<()> {
        *self.state.lock() = InboundState::Binding;

        let context = self
            .context
            .lock()
            .clone()
            .ok_or(TransportError::NotRunning)?;

        // Create ROUTER socket
        let socket = context.socket(zmq::ROUTER)?;

        // Set socket options
        socket.set_linger(self.config.linger_ms())?;
        socket.set_rcvbuf(self.config.receive_buffer_bytes)?;
        if let Some(max_size) = self.config.max_message_size {
            socket.set_maxmsgsize(max_size as i64)?;
        }

        // Bind socket
        let endpoint = self.address.bind_endpoint();
        socket
            .bind(&endpoint)
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", endpoint, e)))?;

        let (exited_tx, exited_rx) = channel::bounded(1);
        let receive_loop = ReceiveLoop {
            socket,
            handoff: self.handoff_tx.clone(),
            running: Arc::clone(&self.running),
            poll_timeout: self.config.poll_timeout,
            min_frame_size: self.config.min_frame_size,
            counters: Arc::clone(&self.counters),
        };

        self.running.store(true, Ordering::Release);
        let handle = thread::Builder::new()
            .name(format!("zmq-router-{}", self.address.port()))
            .spawn(move || {
                receive_loop.run();
                let _ = exited_tx.send(());
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                TransportError::Io(e)
            })?;

        *self.worker.lock() = Some(ReceiveWorker {
            handle,
            exited: exited_rx,
        });
        *self.state.lock() = InboundState::Listening;

        info!(
            "[ZMQ-ROUTER] Created a new ROUTER socket bound to {}. Listening for {}",
            endpoint, self.address
        );
        Ok(())
    }

    pub fn state(&self) -> InboundState {
        *self.state.lock()
    }

    /// Frames waiting in the hand-off queue and the injection lane
    pub fn pending(&self) -> usize {
        self.handoff_rx.len() + self.injected_rx.len()
    }

    /// Next frame from either lane, waiting up to `timeout`
    ///
    /// Each lane is FIFO; nothing is ordered across them.
    fn next_frame(&self, timeout: Duration) -> Option<Vec<u8>> {
        if let Ok(frame) = self.injected_rx.try_recv() {
            return Some(frame);
        }
        if let Ok(frame) = self.handoff_rx.try_recv() {
            return Some(frame);
        }
        channel::select! {
            recv(self.injected_rx) -> frame => frame.ok(),
            recv(self.handoff_rx) -> frame => frame.ok(),
            default(timeout) => None,
        }
    }

    pub fn stats(&self) -> InboundStats {
        self.counters.snapshot()
    }
}

impl Transport for ZmqRouter {
    fn address(&self) -> Option<&ZeroMqAddress> {
        Some(&self.address)
    }

    fn is_operational(&self) -> bool {
        self.state() == InboundState::Listening
    }

    fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                InboundState::Closed => return,
                InboundState::Unbound => {
                    *state = InboundState::Closed;
                    *self.context.lock() = None;
                    return;
                }
                _ => *state = InboundState::Draining,
            }
        }

        self.running.store(false, Ordering::Release);

        if let Some(worker) = self.worker.lock().take() {
            match worker.exited.recv_timeout(self.config.inbound_shutdown_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        warn!("[ZMQ-ROUTER] Receive loop for {} panicked", self.address);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "[ZMQ-ROUTER] Receive loop for {} did not stop within {:?}, detaching",
                        self.address, self.config.inbound_shutdown_timeout
                    );
                }
            }
        }

        info!("[ZMQ-ROUTER] Shutting down the router socket for {}", self.address);
        if self.context.lock().take().is_some() {
            debug!("[ZMQ-ROUTER] Released the context for {}", self.address);
        }
        *self.state.lock() = InboundState::Closed;
    }

    fn transport_type(&self) -> &str {
        if self.empty {
            "zmq-router-empty"
        } else {
            "zmq-router"
        }
    }
}

impl InboundTransport for ZmqRouter {
    fn receive(&self, resolver: &dyn DispatchResolver, timeout: Duration) -> ReceiveOutcome {
        let frame = match self.next_frame(timeout) {
            Some(frame) => frame,
            None => return ReceiveOutcome::Idle,
        };

        let envelope = match Envelope::decode(&frame) {
            Some(envelope) => envelope,
            None => {
                bump(&self.counters.corrupt_envelopes);
                debug!(
                    "[ZMQ-ROUTER] Dropping {} byte frame on {}: not a valid envelope",
                    frame.len(),
                    self.address
                );
                return ReceiveOutcome::Dropped(DropReason::Corrupt);
            }
        };
        debug!("[ZMQ-ROUTER] Message {} deserialized successfully", envelope.message_id);
        log_message_body(&envelope.content_type, &envelope.body);

        let context = ReceiveContext::from_envelope(envelope, self.address.clone());
        match resolver.resolve(&context) {
            Some(handler) => {
                bump(&self.counters.dispatched_messages);
                handler(context);
                ReceiveOutcome::Dispatched
            }
            None => {
                bump(&self.counters.unrouted_messages);
                info!(
                    "[ZMQ-ROUTER] No handler found in the lookup chain. Message {} came in as {}",
                    context.message_id(),
                    context.content_type()
                );
                ReceiveOutcome::Dropped(DropReason::NoHandler)
            }
        }
    }

    fn inject(&self, frame: Vec<u8>) -> bool {
        if self.state() == InboundState::Closed {
            debug!("[ZMQ-ROUTER] {} is closed, dropping injected frame", self.address);
            return false;
        }
        // Unbounded and both ends live in self: never blocks, never disconnected
        self.injected_tx.send(frame).is_ok()
    }
}

impl Drop for ZmqRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State moved onto the receive thread; the socket never leaves it
struct ReceiveLoop {
    socket: zmq::Socket,
    handoff: Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
    min_frame_size: usize,
    counters: Arc<InboundCounters>,
}

impl ReceiveLoop {
    fn run(self) {
        debug!("[ZMQ-ROUTER] Receive loop started");
        let poll_timeout_ms = self.poll_timeout.as_millis().min(i64::MAX as u128) as i64;

        while self.is_running() {
            let mut poll_items = [self.socket.as_poll_item(zmq::POLLIN)];
            match zmq::poll(&mut poll_items, poll_timeout_ms) {
                Ok(_) => {}
                Err(zmq::Error::ETERM) => break,
                Err(e) => {
                    if self.is_running() {
                        error!("[ZMQ-ROUTER] Poll error: {}", e);
                    }
                    continue;
                }
            }
            if !poll_items[0].is_readable() {
                continue;
            }

            // Multipart message: [peer identity, payload]
            match self.socket.recv_multipart(zmq::DONTWAIT) {
                Ok(frames) => self.accept(frames),
                Err(zmq::Error::EAGAIN) => {}
                Err(e) => {
                    if self.is_running() {
                        error!("[ZMQ-ROUTER] Receive error: {}", e);
                    }
                }
            }
        }

        debug!("[ZMQ-ROUTER] Receive loop exiting");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn accept(&self, mut frames: Vec<Vec<u8>>) {
        bump(&self.counters.frames_received);
        if frames.len() < 2 {
            bump(&self.counters.undersized_frames);
            return;
        }
        let frame = match frames.pop() {
            Some(frame) => frame,
            None => return,
        };
        add(&self.counters.bytes_received, frame.len());

        if frame.len() < self.min_frame_size {
            bump(&self.counters.undersized_frames);
            debug!("[ZMQ-ROUTER] Discarding {} byte frame as noise", frame.len());
            return;
        }

        debug!("[ZMQ-ROUTER] Received a message {} bytes", frame.len());
        self.push(frame);
    }

    /// Blocking insert that still notices shutdown while the queue is full
    fn push(&self, mut frame: Vec<u8>) {
        loop {
            match self.handoff.send_timeout(frame, self.poll_timeout) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !self.is_running() {
                        return;
                    }
                    frame = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}
