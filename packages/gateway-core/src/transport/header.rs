//! Fixed 16-byte datagram header, encode/decode.

use crate::protocol_constants::{DATAGRAM_HEADER_SIZE, DATAGRAM_TYPE_AUDIO};

/// Parsed fixed header. Also serves as the stream cipher's IV when encoded
/// back to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub packet_type: u8,
    pub flags: u8,
    pub payload_len: u16,
    pub connection_id: u32,
    pub timestamp: u32,
    pub sequence: u32,
}

impl DatagramHeader {
    /// Parses the header from `buf`. Returns `None` if too short or the
    /// type is not [`DATAGRAM_TYPE_AUDIO`].
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < DATAGRAM_HEADER_SIZE {
            return None;
        }
        let packet_type = buf[0];
        if packet_type != DATAGRAM_TYPE_AUDIO {
            return None;
        }
        let flags = buf[1];
        let payload_len = u16::from_be_bytes([buf[2], buf[3]]);
        let connection_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let timestamp = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let sequence = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        Some(Self {
            packet_type,
            flags,
            payload_len,
            connection_id,
            timestamp,
            sequence,
        })
    }

    /// Encodes the header to its wire form, also usable as the cipher IV.
    pub fn encode(&self) -> [u8; DATAGRAM_HEADER_SIZE] {
        let mut buf = [0u8; DATAGRAM_HEADER_SIZE];
        buf[0] = self.packet_type;
        buf[1] = self.flags;
        buf[2..4].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[4..8].copy_from_slice(&self.connection_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[12..16].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_round_trips() {
        let header = DatagramHeader {
            packet_type: DATAGRAM_TYPE_AUDIO,
            flags: 0,
            payload_len: 1234,
            connection_id: 0xdead_beef,
            timestamp: 0x0011_2233,
            sequence: 7,
        };
        let encoded = header.encode();
        let decoded = DatagramHeader::parse(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(DatagramHeader::parse(&[0u8; 10]).is_none());
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let mut buf = [0u8; DATAGRAM_HEADER_SIZE];
        buf[0] = 99;
        assert!(DatagramHeader::parse(&buf).is_none());
    }
}
