//! Transport configuration

use crate::common::{TransportError, TransportResult};
use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Half-open range `[start, end)` that ephemeral control ports are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port < self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 10000,
            end: 20000,
        }
    }
}

/// Settings shared by every transport a factory builds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// How long the receive loop blocks on the socket before re-checking shutdown
    pub poll_timeout: Duration,

    /// Capacity of the inbound hand-off queue (the receive loop waits when full)
    pub handoff_capacity: usize,

    /// Frames shorter than this are discarded by the receive loop
    pub min_frame_size: usize,

    /// Kernel receive buffer for ROUTER sockets, in bytes
    pub receive_buffer_bytes: i32,

    /// Kernel send buffer for DEALER sockets, in bytes
    pub send_buffer_bytes: i32,

    /// Frames a DEALER holds for its peer before writes start timing out
    pub send_high_water_mark: i32,

    /// Timeout for a single blocking socket write (None = block forever)
    pub send_timeout: Option<Duration>,

    /// Linger time on close (None = immediate)
    pub linger: Option<Duration>,

    /// Maximum message size (None = unlimited)
    pub max_message_size: Option<usize>,

    /// Bounded wait for the receive loop to exit on shutdown
    pub inbound_shutdown_timeout: Duration,

    /// Bounded wait for the send loop to drain and exit on shutdown
    pub outbound_shutdown_timeout: Duration,

    /// Range ephemeral control-channel ports are allocated from
    pub ephemeral_ports: PortRange,

    /// Number of random candidates probed before giving up
    pub port_probe_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(250),
            handoff_capacity: 10_000,
            min_frame_size: Envelope::MIN_ENCODED_LEN,
            receive_buffer_bytes: 10 * 1024 * 1024,
            send_buffer_bytes: 10 * 1024 * 1024,
            send_high_water_mark: 1000,
            send_timeout: Some(Duration::from_secs(5)),
            linger: None,
            max_message_size: Some(10 * 1024 * 1024), // 10 MB default
            inbound_shutdown_timeout: Duration::from_secs(1),
            outbound_shutdown_timeout: Duration::from_secs(10),
            ephemeral_ports: PortRange::default(),
            port_probe_attempts: 1000,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set receive poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set hand-off queue capacity
    pub fn with_handoff_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity;
        self
    }

    /// Set minimum accepted frame size
    pub fn with_min_frame_size(mut self, size: usize) -> Self {
        self.min_frame_size = size;
        self
    }

    /// Set send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the DEALER send high-water mark
    pub fn with_send_high_water_mark(mut self, frames: i32) -> Self {
        self.send_high_water_mark = frames;
        self
    }

    /// Block forever on socket writes
    pub fn with_no_send_timeout(mut self) -> Self {
        self.send_timeout = None;
        self
    }

    /// Set linger time
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    /// Set maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Set shutdown waits for the receive and send loops
    pub fn with_shutdown_timeouts(mut self, inbound: Duration, outbound: Duration) -> Self {
        self.inbound_shutdown_timeout = inbound;
        self.outbound_shutdown_timeout = outbound;
        self
    }

    /// Set ephemeral port range and probe budget
    pub fn with_ephemeral_ports(mut self, range: PortRange, attempts: u32) -> Self {
        self.ephemeral_ports = range;
        self.port_probe_attempts = attempts;
        self
    }

    /// Linger in the unit libzmq expects
    pub(crate) fn linger_ms(&self) -> i32 {
        self.linger
            .map(|l| l.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(0)
    }

    /// Send timeout in the unit libzmq expects (-1 = infinite)
    pub(crate) fn send_timeout_ms(&self) -> i32 {
        self.send_timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1)
    }

    /// Validate configuration
    pub fn validate(&self) -> TransportResult<()> {
        if self.poll_timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "poll_timeout must be greater than 0".to_string(),
            ));
        }

        if self.handoff_capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "handoff_capacity must be greater than 0".to_string(),
            ));
        }

        if let Some(max_size) = self.max_message_size {
            if max_size < Envelope::MIN_ENCODED_LEN {
                return Err(TransportError::InvalidConfig(format!(
                    "max_message_size must be at least {} bytes",
                    Envelope::MIN_ENCODED_LEN
                )));
            }
        }

        if self.ephemeral_ports.start >= self.ephemeral_ports.end {
            return Err(TransportError::InvalidConfig(format!(
                "ephemeral port range {}..{} is empty",
                self.ephemeral_ports.start, self.ephemeral_ports.end
            )));
        }

        if self.port_probe_attempts == 0 {
            return Err(TransportError::InvalidConfig(
                "port_probe_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
