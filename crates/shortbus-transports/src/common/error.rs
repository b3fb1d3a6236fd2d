//! Common error types for all transports

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport error type
///
/// Steady-state message loss (corrupt frames, unrouted messages, transient
/// socket failures) is never reported through this type. Only configuration
/// problems, address resolution failures and invalid outgoing payloads are.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The URI could not be parsed into host, port and path
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No free ephemeral port was found within the probe budget
    #[error("No free port found in {start}..{end} after {attempts} attempts")]
    PortExhausted { attempts: u32, start: u16, end: u16 },

    /// Failed to bind server socket
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// Failed to connect client socket
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send message
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Transport is not running
    #[error("Transport is not running")]
    NotRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Message too large
    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    /// Payload or envelope serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport-specific error
    #[cfg(feature = "zmq")]
    #[error("ZMQ error: {0}")]
    Zmq(#[from] zmq::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
