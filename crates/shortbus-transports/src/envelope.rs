// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wire envelope carried by every ZMQ frame
//!
//! # Format
//! - Magic `SBZE` (4 bytes)
//! - Version (1 byte) + reserved (3 bytes, zero)
//! - Content type length, message id length, body length (3 x u32, little endian)
//! - Content type (UTF-8), message id (UTF-8), body (opaque)
//!
//! The 20 byte header is also the minimum valid frame: anything shorter is noise.

use crate::common::{TransportError, TransportResult};
use byteorder::{ByteOrder, LittleEndian};

/// Self-contained record of one bus message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub content_type: String,
    pub message_id: String,
    pub body: Vec<u8>,
}

impl Envelope {
    pub const MAGIC: [u8; 4] = *b"SBZE";

    pub const CURRENT_VERSION: u8 = 1;

    pub const HEADER_BYTE_COUNT: usize = 20; // 4 magic, 1 version, 3 reserved, 3 x u32

    pub const MIN_ENCODED_LEN: usize = Self::HEADER_BYTE_COUNT;

    pub fn new(
        content_type: impl Into<String>,
        message_id: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            message_id: message_id.into(),
            body,
        }
    }

    /// Number of bytes `encode` will produce
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_BYTE_COUNT + self.content_type.len() + self.message_id.len() + self.body.len()
    }

    /// Encode into a single frame
    ///
    /// Fails only when a field does not fit the u32 length prefix.
    pub fn encode(&self) -> TransportResult<Vec<u8>> {
        let content_type_len = length_prefix("content type", self.content_type.len())?;
        let message_id_len = length_prefix("message id", self.message_id.len())?;
        let body_len = length_prefix("body", self.body.len())?;

        let mut bytes = vec![0u8; Self::HEADER_BYTE_COUNT];
        bytes[0..4].copy_from_slice(&Self::MAGIC);
        bytes[4] = Self::CURRENT_VERSION;
        LittleEndian::write_u32(&mut bytes[8..12], content_type_len);
        LittleEndian::write_u32(&mut bytes[12..16], message_id_len);
        LittleEndian::write_u32(&mut bytes[16..20], body_len);

        bytes.reserve(self.encoded_len() - Self::HEADER_BYTE_COUNT);
        bytes.extend_from_slice(self.content_type.as_bytes());
        bytes.extend_from_slice(self.message_id.as_bytes());
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    /// Decode a frame, returning `None` for anything that is not a complete envelope
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::MIN_ENCODED_LEN {
            return None;
        }
        if bytes[0..4] != Self::MAGIC || bytes[4] != Self::CURRENT_VERSION {
            return None;
        }

        let content_type_len = LittleEndian::read_u32(&bytes[8..12]) as usize;
        let message_id_len = LittleEndian::read_u32(&bytes[12..16]) as usize;
        let body_len = LittleEndian::read_u32(&bytes[16..20]) as usize;

        let payload = &bytes[Self::HEADER_BYTE_COUNT..];
        let declared = content_type_len
            .checked_add(message_id_len)?
            .checked_add(body_len)?;
        if declared != payload.len() {
            return None;
        }

        let (content_type, rest) = payload.split_at(content_type_len);
        let (message_id, body) = rest.split_at(message_id_len);

        Some(Self {
            content_type: String::from_utf8(content_type.to_vec()).ok()?,
            message_id: String::from_utf8(message_id.to_vec()).ok()?,
            body: body.to_vec(),
        })
    }
}

fn length_prefix(field: &str, len: usize) -> TransportResult<u32> {
    u32::try_from(len).map_err(|_| {
        TransportError::Serialization(format!("{} of {} bytes exceeds u32 length prefix", field, len))
    })
}
