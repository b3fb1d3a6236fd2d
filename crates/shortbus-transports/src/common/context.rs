//! Contexts exchanged with the bus pipeline
//!
//! The pipeline hands outgoing messages to a transport as a [`SendContext`] and
//! receives incoming ones as a [`ReceiveContext`]. Routing is delegated back to
//! the pipeline through a [`DispatchResolver`].

use crate::address::ZeroMqAddress;
use crate::common::TransportResult;
use crate::envelope::Envelope;
use serde::Serialize;
use std::io::{self, Cursor, Write};

/// An incoming message, decoded from its envelope
#[derive(Debug, Clone)]
pub struct ReceiveContext {
    body: Vec<u8>,
    message_id: String,
    content_type: String,
    input_address: ZeroMqAddress,
}

impl ReceiveContext {
    pub fn from_envelope(envelope: Envelope, input_address: ZeroMqAddress) -> Self {
        Self {
            body: envelope.body,
            message_id: envelope.message_id,
            content_type: envelope.content_type,
            input_address,
        }
    }

    /// Message body as a readable stream
    pub fn body_stream(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.body)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Address of the transport the message arrived on
    pub fn input_address(&self) -> &ZeroMqAddress {
        &self.input_address
    }
}

/// An outgoing message as the bus pipeline presents it
///
/// The transport never sees the application payload's shape, only its bytes.
pub trait SendContext {
    /// Serialize the application payload into `out`
    fn serialize_to(&self, out: &mut dyn Write) -> io::Result<()>;

    fn content_type(&self) -> &str;

    fn message_id(&self) -> &str;

    /// Destination as requested by the pipeline, used for logging only
    fn destination_address(&self) -> Option<&str> {
        None
    }

    /// Build the wire envelope for this message
    fn to_envelope(&self) -> TransportResult<Envelope> {
        let mut body = Vec::new();
        self.serialize_to(&mut body)?;
        Ok(Envelope::new(self.content_type(), self.message_id(), body))
    }
}

/// A [`SendContext`] over already-serialized bytes
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub content_type: String,
    pub message_id: String,
    pub body: Vec<u8>,
    pub destination: Option<String>,
}

impl OutboundMessage {
    pub fn new(
        content_type: impl Into<String>,
        message_id: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            message_id: message_id.into(),
            body,
            destination: None,
        }
    }

    /// Serialize `payload` as JSON with content type `application/json`
    pub fn json<T: Serialize>(message_id: impl Into<String>, payload: &T) -> TransportResult<Self> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self::new("application/json", message_id, body))
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

impl SendContext for OutboundMessage {
    fn serialize_to(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.body)
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }

    fn destination_address(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

/// Handler chosen for one message, run on the thread that called `receive`
pub type MessageHandler = Box<dyn FnOnce(ReceiveContext)>;

/// Wrap a closure as a [`MessageHandler`]
pub fn handler<F>(f: F) -> MessageHandler
where
    F: FnOnce(ReceiveContext) + 'static,
{
    Box::new(f)
}

/// Given a context, optionally produce the handler that should consume it
pub trait DispatchResolver {
    fn resolve(&self, context: &ReceiveContext) -> Option<MessageHandler>;
}

impl<F> DispatchResolver for F
where
    F: Fn(&ReceiveContext) -> Option<MessageHandler>,
{
    fn resolve(&self, context: &ReceiveContext) -> Option<MessageHandler> {
        self(context)
    }
}
