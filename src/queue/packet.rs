//! Stream packet framing.
//!
//! Every packet on a named stream is a fixed 16-byte little-endian header
//! followed by the encoded [`Message`] body:
//!
//! ```text
//! offset  size  field
//! 0       1     magic (0xD5)
//! 1       1     datatype tag
//! 2       2     reserved (0)
//! 4       4     body length
//! 8       8     timestamp, microseconds
//! 16      n     body
//! ```

use crate::datatype::{DatatypeKind, Message};
use crate::error::{DevLinkError, Result};
use std::time::Duration;

pub const PACKET_MAGIC: u8 = 0xD5;
pub const HEADER_LEN: usize = 16;
/// Upper bound on what a body adds around its data section: frame metadata
/// and varint length prefixes.
pub const BODY_OVERHEAD: usize = 64;

/// Parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: DatatypeKind,
    pub length: u32,
    pub timestamp: Duration,
}

impl PacketHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(DevLinkError::MalformedPayload(format!(
                "packet shorter than header: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != PACKET_MAGIC {
            return Err(DevLinkError::MalformedPayload(format!(
                "bad packet magic 0x{:02X}",
                bytes[0]
            )));
        }
        let kind = DatatypeKind::from_tag(bytes[1]).ok_or_else(|| {
            DevLinkError::MalformedPayload(format!("unknown datatype tag {}", bytes[1]))
        })?;
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[8..16]);
        Ok(Self {
            kind,
            length,
            timestamp: Duration::from_micros(u64::from_le_bytes(ts)),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(PACKET_MAGIC);
        out.push(self.kind.tag());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&(self.timestamp.as_micros() as u64).to_le_bytes());
    }
}

/// A decoded packet: header timestamp plus the typed message.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPacket {
    pub timestamp: Duration,
    pub message: Message,
}

impl StreamPacket {
    pub fn new(message: Message, timestamp: Duration) -> Self {
        Self { timestamp, message }
    }

    /// Frame a message for writing to a stream.
    pub fn serialize(message: &Message, timestamp: Duration) -> Result<Vec<u8>> {
        let body = message.encode()?;
        let header = PacketHeader {
            kind: message.kind(),
            length: body.len() as u32,
            timestamp,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        header.write(&mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a raw packet read from a stream.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::parse(bytes)?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != header.length as usize {
            return Err(DevLinkError::MalformedPayload(format!(
                "length mismatch: header says {}, body has {}",
                header.length,
                body.len()
            )));
        }
        Ok(Self {
            timestamp: header.timestamp,
            message: Message::decode(header.kind, body)?,
        })
    }

    /// Peek at the datatype tag without decoding the body.
    pub fn peek_kind(bytes: &[u8]) -> Result<DatatypeKind> {
        PacketHeader::parse(bytes).map(|h| h.kind)
    }
}
