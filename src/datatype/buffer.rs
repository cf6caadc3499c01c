//! Generic raw-bytes payload.

use super::{DatatypeKind, Message, Payload};
use serde::{Deserialize, Serialize};

/// Opaque byte payload. Also the fallback for host-defined data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Payload for Buffer {
    const KIND: DatatypeKind = DatatypeKind::Buffer;

    fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::Buffer(b) => Some(b),
            _ => None,
        }
    }

    fn peek(msg: &Message) -> Option<&Self> {
        match msg {
            Message::Buffer(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let buf = Buffer::new((0u8..12).collect());
        let bytes = buf.encode().unwrap();
        // one length byte, then the data
        assert_eq!(bytes.len(), 13);
        assert_eq!(&bytes[1..], &buf.data[..]);
        assert_eq!(Buffer::decode(&bytes).unwrap(), buf);
    }

    #[test]
    fn test_empty() {
        let bytes = Buffer::default().encode().unwrap();
        assert!(Buffer::decode(&bytes).unwrap().is_empty());
        assert!(Buffer::decode(&[]).is_err());
    }

    #[test]
    fn test_length_beyond_body() {
        assert!(Buffer::decode(&[5, 1, 2]).is_err());
    }
}
