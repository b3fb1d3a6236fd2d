// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ DEALER outbound transport
//!
//! The socket is created up front but only connected on the first send, under
//! the socket lock, so building a transport for an unreachable peer never
//! blocks. Sends are queued and a background loop writes them to the socket in
//! order; the caller gets control back as soon as the frame is queued.

use crate::address::ZeroMqAddress;
use crate::common::stats::{add, bump, OutboundCounters};
use crate::common::{OutboundStats, SendContext, TransportConfig, TransportError, TransportResult};
use crate::traits::{OutboundTransport, Transport};
use crate::zmq::log_message_body;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DISCONNECTED: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;
const FAILED: u8 = 3;

/// How long shutdown waits for a send in flight before leaving the socket to the loop
const SOCKET_RELEASE_WAIT: Duration = Duration::from_millis(100);

/// Connection lifecycle of an outbound transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            CONNECTING => Self::Connecting,
            CONNECTED => Self::Connected,
            FAILED => Self::Failed,
            _ => Self::Disconnected,
        }
    }
}

/// ZMQ DEALER socket implementation (sender)
pub struct ZmqDealer {
    address: Option<ZeroMqAddress>,
    config: TransportConfig,
    socket: Arc<Mutex<Option<zmq::Socket>>>,
    connection: AtomicU8,
    running: Arc<AtomicBool>,
    queue: Mutex<Option<Sender<Vec<u8>>>>,
    worker: Mutex<Option<SendWorker>>,
    context: Mutex<Option<zmq::Context>>,
    counters: Arc<OutboundCounters>,
}

struct SendWorker {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl ZmqDealer {
    /// Create a DEALER for `address` and start its send loop
    ///
    /// No connection is attempted until the first send. Socket setup failures
    /// are logged and leave the transport non-operational.
    pub fn new(context: zmq::Context, address: ZeroMqAddress, config: TransportConfig) -> Self {
        let dealer = Self {
            address: Some(address),
            config,
            socket: Arc::new(Mutex::new(None)),
            connection: AtomicU8::new(DISCONNECTED),
            running: Arc::new(AtomicBool::new(false)),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
            context: Mutex::new(Some(context)),
            counters: Arc::new(OutboundCounters::default()),
        };

        if let Err(e) = dealer.start() {
            error!(
                "[ZMQ-DEALER] Failed to create send transport for {}: {}",
                dealer.describe(),
                e
            );
            dealer.connection.store(FAILED, Ordering::Release);
            *dealer.context.lock() = None;
        }
        dealer
    }

    /// Create a sender that accepts and discards every message
    pub fn disabled() -> Self {
        info!("[ZMQ-DEALER] Creating an empty send transport");
        Self {
            address: None,
            config: TransportConfig::default(),
            socket: Arc::new(Mutex::new(None)),
            connection: AtomicU8::new(DISCONNECTED),
            running: Arc::new(AtomicBool::new(false)),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
            context: Mutex::new(None),
            counters: Arc::new(OutboundCounters::default()),
        }
    }

    fn start(&self) -> TransportResult<()> {
        let context = self
            .context
            .lock()
            .clone()
            .ok_or(TransportError::NotRunning)?;

        // Create DEALER socket
        let socket = context.socket(zmq::DEALER)?;

        // Set socket options
        socket.set_linger(self.config.linger_ms())?;
        socket.set_sndbuf(self.config.send_buffer_bytes)?;
        socket.set_sndhwm(self.config.send_high_water_mark)?;
        socket.set_sndtimeo(self.config.send_timeout_ms())?;

        *self.socket.lock() = Some(socket);

        let (tx, rx) = channel::unbounded();
        let (exited_tx, exited_rx) = channel::bounded(1);
        let send_loop = SendLoop {
            queue: rx,
            socket: Arc::clone(&self.socket),
            running: Arc::clone(&self.running),
            counters: Arc::clone(&self.counters),
            destination: self.describe(),
        };

        self.running.store(true, Ordering::Release);
        let port = self.address.as_ref().map(|a| a.port()).unwrap_or_default();
        let handle = thread::Builder::new()
            .name(format!("zmq-dealer-{}", port))
            .spawn(move || {
                send_loop.run();
                let _ = exited_tx.send(());
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                TransportError::Io(e)
            })?;

        *self.queue.lock() = Some(tx);
        *self.worker.lock() = Some(SendWorker {
            handle,
            exited: exited_rx,
        });

        debug!("[ZMQ-DEALER] Created a new DEALER socket for {}", self.describe());
        Ok(())
    }

    fn describe(&self) -> String {
        self.address
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "null://null".to_string())
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> OutboundStats {
        self.counters.snapshot()
    }

    /// Connect on first use; exactly one caller performs the connect
    fn ensure_connected(&self) -> TransportResult<()> {
        if self.connection.load(Ordering::Acquire) == CONNECTED {
            return Ok(());
        }

        let address = self.address.as_ref().ok_or(TransportError::NotRunning)?;

        let guard = self.socket.lock();
        match self.connection.compare_exchange(
            DISCONNECTED,
            CONNECTING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let socket = match guard.as_ref() {
                    Some(socket) => socket,
                    None => {
                        self.connection.store(DISCONNECTED, Ordering::Release);
                        return Err(TransportError::NotRunning);
                    }
                };

                let endpoint = address.connect_endpoint();
                match socket.connect(&endpoint) {
                    Ok(()) => {
                        self.connection.store(CONNECTED, Ordering::Release);
                        info!("🦀 [ZMQ-DEALER] Socket connected to {} for SENDING", endpoint);
                        Ok(())
                    }
                    Err(e) => {
                        self.connection.store(FAILED, Ordering::Release);
                        self.running.store(false, Ordering::Release);
                        let err = TransportError::ConnectFailed(format!("{}: {}", endpoint, e));
                        error!("[ZMQ-DEALER] {}", err);
                        Err(err)
                    }
                }
            }
            // Lock is held, so nobody is mid-connect
            Err(CONNECTED) => Ok(()),
            Err(_) => Err(TransportError::ConnectFailed(format!(
                "{}: earlier connect failed",
                address.connect_endpoint()
            ))),
        }
    }
}

impl Transport for ZmqDealer {
    fn address(&self) -> Option<&ZeroMqAddress> {
        self.address.as_ref()
    }

    fn is_operational(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.connection.load(Ordering::Acquire) != FAILED
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::Release);

        // Closing the queue lets the loop drain what is left and exit
        drop(self.queue.lock().take());

        if let Some(worker) = self.worker.lock().take() {
            match worker.exited.recv_timeout(self.config.outbound_shutdown_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        warn!("[ZMQ-DEALER] Send loop for {} panicked", self.describe());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "[ZMQ-DEALER] Send loop for {} did not stop within {:?}, detaching",
                        self.describe(),
                        self.config.outbound_shutdown_timeout
                    );
                }
            }
        }

        match self.socket.try_lock_for(SOCKET_RELEASE_WAIT) {
            Some(mut socket) => {
                if socket.take().is_some() {
                    info!("[ZMQ-DEALER] Shutting down the dealer socket for {}", self.describe());
                }
            }
            None => warn!(
                "[ZMQ-DEALER] Socket for {} still busy, leaving it to the send loop",
                self.describe()
            ),
        }

        if self.context.lock().take().is_some() {
            debug!("[ZMQ-DEALER] Released the context for {}", self.describe());
        }
    }

    fn transport_type(&self) -> &str {
        if self.address.is_some() {
            "zmq-dealer"
        } else {
            "zmq-dealer-disabled"
        }
    }
}

impl OutboundTransport for ZmqDealer {
    fn send(&self, context: &dyn SendContext) -> TransportResult<()> {
        if !self.running.load(Ordering::Acquire) {
            bump(&self.counters.messages_dropped);
            debug!(
                "[ZMQ-DEALER] Send transport for {} is not running. Dropping message {}",
                self.describe(),
                context.message_id()
            );
            return Ok(());
        }

        let envelope = context.to_envelope()?;
        let frame = envelope.encode()?;
        if let Some(max_size) = self.config.max_message_size {
            if frame.len() > max_size {
                return Err(TransportError::MessageTooLarge {
                    size: frame.len(),
                    max_size,
                });
            }
        }

        if let Err(e) = self.ensure_connected() {
            bump(&self.counters.messages_dropped);
            debug!("[ZMQ-DEALER] Dropping message {}: {}", envelope.message_id, e);
            return Ok(());
        }

        log_message_body(&envelope.content_type, &envelope.body);

        let queued = match self.queue.lock().as_ref() {
            Some(queue) => queue.send(frame).is_ok(),
            None => false,
        };
        if queued {
            bump(&self.counters.messages_queued);
            debug!(
                "[ZMQ-DEALER] Message {} queued for {} (requested {})",
                envelope.message_id,
                self.describe(),
                context.destination_address().unwrap_or("-")
            );
        } else {
            bump(&self.counters.messages_dropped);
            debug!(
                "[ZMQ-DEALER] Send transport for {} shut down. Dropping message {}",
                self.describe(),
                envelope.message_id
            );
        }
        Ok(())
    }
}

impl Drop for ZmqDealer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SendLoop {
    queue: Receiver<Vec<u8>>,
    socket: Arc<Mutex<Option<zmq::Socket>>>,
    running: Arc<AtomicBool>,
    counters: Arc<OutboundCounters>,
    destination: String,
}

impl SendLoop {
    fn run(self) {
        debug!("[ZMQ-DEALER] Send loop started for {}", self.destination);

        while let Ok(frame) = self.queue.recv() {
            let guard = self.socket.lock();
            let socket = match guard.as_ref() {
                Some(socket) => socket,
                None => break,
            };

            match socket.send(frame.as_slice(), 0) {
                Ok(()) => {
                    bump(&self.counters.messages_sent);
                    add(&self.counters.bytes_sent, frame.len());
                    debug!("[ZMQ-DEALER] Message SENT to {}", self.destination);
                }
                Err(e) => {
                    bump(&self.counters.send_errors);
                    let err = TransportError::SendFailed(format!("{}: {}", self.destination, e));
                    if self.running.load(Ordering::Acquire) {
                        error!("[ZMQ-DEALER] {}", err);
                    } else {
                        debug!("[ZMQ-DEALER] {} (during shutdown)", err);
                    }
                }
            }
        }

        debug!("[ZMQ-DEALER] Send loop exiting for {}", self.destination);
    }
}
