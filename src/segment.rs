//! Wire-format definitions for protocol segments and acknowledgments.
//!
//! Two message shapes cross the network:
//! - [`Segment`] — sender → receiver: sequence number, SYN/FIN/RST flags,
//!   payload bytes.
//! - [`AckMessage`] — receiver → sender: acknowledgment number (optional
//!   until the receiver has seen a SYN), advertised window, RST flag.
//!
//! This module also owns the binary codec for both; no I/O happens here,
//! only data transformation.  Checksums are deliberately absent: the link
//! layer below us validates integrity before anything reaches `decode`.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//! Segment:     | seq (4) | flags (1) | payload_len (2) | payload ... |
//! AckMessage:  | flags (1) | ackno (4) | window (2) |
//! ```
//!
//! The same flag byte is used in both directions; `ACK` marks the ackno
//! field as meaningful and is never set on data segments.

use thiserror::Error;

use crate::wrap32::Wrap32;

/// Bit-flag constants for the `flags` field.
pub mod flags {
    /// Synchronise sequence numbers (stream start).
    pub const SYN: u8 = 0b0000_0001;
    /// Finish — no data follows this segment.
    pub const FIN: u8 = 0b0000_0010;
    /// Reset — this half of the connection has permanently failed.
    pub const RST: u8 = 0b0000_0100;
    /// Acknowledgment field is valid (ack messages only).
    pub const ACK: u8 = 0b0000_1000;

    /// Every bit with a defined meaning.
    pub(super) const KNOWN: u8 = SYN | FIN | RST | ACK;
}

/// Byte length of the fixed segment header on the wire.
pub const SEGMENT_HEADER_LEN: usize = 7;

/// Byte length of an encoded [`AckMessage`].
pub const ACK_MESSAGE_LEN: usize = 7;

// Byte offsets within the serialised segment header.
const OFF_SEQ: usize = 0;
const OFF_FLAGS: usize = 4;
const OFF_PAYLOAD_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw datagram.
///
/// These surface only at the codec boundary; the transport state machines
/// never see malformed input (the driver drops it).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer shorter than the fixed header size.
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    /// `payload_len` field does not match the actual remaining bytes.
    #[error("payload_len field does not match remaining bytes")]
    LengthMismatch,
    /// Reserved flag bits were set.
    #[error("unknown flag bits set: {0:#010b}")]
    UnknownFlags(u8),
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A data-bearing segment travelling sender → receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Wire sequence number of the first thing this segment occupies
    /// (the SYN if present, otherwise the first payload byte).
    pub seqno: Wrap32,
    /// This segment establishes the stream start.
    pub syn: bool,
    /// This segment is the last one carrying stream data.
    pub fin: bool,
    /// This half of the connection has permanently failed.
    pub rst: bool,
    /// Stream bytes, at most the configured maximum payload size.
    pub payload: Vec<u8>,
}

impl Segment {
    /// How many sequence numbers this segment occupies: SYN and FIN each
    /// consume one in addition to every payload byte.
    pub fn sequence_length(&self) -> u64 {
        self.syn as u64 + self.payload.len() as u64 + self.fin as u64
    }

    /// Serialise into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SEGMENT_HEADER_LEN + self.payload.len()];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seqno.raw().to_be_bytes());

        let mut f = 0u8;
        if self.syn {
            f |= flags::SYN;
        }
        if self.fin {
            f |= flags::FIN;
        }
        if self.rst {
            f |= flags::RST;
        }
        buf[OFF_FLAGS] = f;

        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2]
            .copy_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf[SEGMENT_HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Segment`] from a raw byte slice.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < SEGMENT_HEADER_LEN {
            return Err(CodecError::BufferTooShort);
        }
        let f = buf[OFF_FLAGS];
        if f & !flags::KNOWN != 0 {
            return Err(CodecError::UnknownFlags(f));
        }
        let payload_len =
            u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]) as usize;
        if buf.len() != SEGMENT_HEADER_LEN + payload_len {
            return Err(CodecError::LengthMismatch);
        }
        let seqno = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

        Ok(Segment {
            seqno: Wrap32::new(seqno),
            syn: f & flags::SYN != 0,
            fin: f & flags::FIN != 0,
            rst: f & flags::RST != 0,
            payload: buf[SEGMENT_HEADER_LEN..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// AckMessage
// ---------------------------------------------------------------------------

/// The receiver's report travelling receiver → sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckMessage {
    /// Next sequence number the receiver expects; `None` until the
    /// receiver has learned the ISN from a SYN.
    pub ackno: Option<Wrap32>,
    /// How many more bytes the receiver can currently buffer, capped at
    /// the 16-bit wire field.
    pub window_size: u16,
    /// This half of the connection has permanently failed.
    pub rst: bool,
}

impl AckMessage {
    /// Serialise into a fixed-size byte array.
    pub fn encode(&self) -> [u8; ACK_MESSAGE_LEN] {
        let mut buf = [0u8; ACK_MESSAGE_LEN];
        let mut f = 0u8;
        if self.ackno.is_some() {
            f |= flags::ACK;
        }
        if self.rst {
            f |= flags::RST;
        }
        buf[0] = f;
        if let Some(ackno) = self.ackno {
            buf[1..5].copy_from_slice(&ackno.raw().to_be_bytes());
        }
        buf[5..7].copy_from_slice(&self.window_size.to_be_bytes());
        buf
    }

    /// Parse an [`AckMessage`] from a raw byte slice.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < ACK_MESSAGE_LEN {
            return Err(CodecError::BufferTooShort);
        }
        if buf.len() != ACK_MESSAGE_LEN {
            return Err(CodecError::LengthMismatch);
        }
        let f = buf[0];
        if f & !(flags::ACK | flags::RST) != 0 {
            return Err(CodecError::UnknownFlags(f));
        }
        let ackno = (f & flags::ACK != 0)
            .then(|| Wrap32::new(u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]])));
        Ok(AckMessage {
            ackno,
            window_size: u16::from_be_bytes([buf[5], buf[6]]),
            rst: f & flags::RST != 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_segment(seq: u32, syn: bool, fin: bool, payload: &[u8]) -> Segment {
        Segment {
            seqno: Wrap32::new(seq),
            syn,
            fin,
            rst: false,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn sequence_length_counts_syn_and_fin() {
        assert_eq!(make_segment(0, false, false, b"").sequence_length(), 0);
        assert_eq!(make_segment(0, true, false, b"").sequence_length(), 1);
        assert_eq!(make_segment(0, true, true, b"abc").sequence_length(), 5);
    }

    #[test]
    fn segment_roundtrip() {
        let seg = make_segment(0x0102_0304, true, false, b"hello");
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded, seg);
    }

    #[test]
    fn segment_seq_big_endian_on_wire() {
        let bytes = make_segment(0x0102_0304, false, false, b"").encode();
        assert_eq!(&bytes[..4], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn segment_decode_short_buffer() {
        assert_eq!(
            Segment::decode(&[0u8; SEGMENT_HEADER_LEN - 1]),
            Err(CodecError::BufferTooShort)
        );
    }

    #[test]
    fn segment_decode_truncated_payload() {
        let mut bytes = make_segment(1, false, false, b"data").encode();
        bytes.pop(); // payload_len still claims 4 bytes
        assert_eq!(Segment::decode(&bytes), Err(CodecError::LengthMismatch));
    }

    #[test]
    fn segment_decode_rejects_reserved_flags() {
        let mut bytes = make_segment(1, false, false, b"").encode();
        bytes[OFF_FLAGS] |= 0b1000_0000;
        assert!(matches!(
            Segment::decode(&bytes),
            Err(CodecError::UnknownFlags(_))
        ));
    }

    #[test]
    fn ack_roundtrip_with_and_without_ackno() {
        let with = AckMessage {
            ackno: Some(Wrap32::new(99)),
            window_size: 4096,
            rst: false,
        };
        assert_eq!(AckMessage::decode(&with.encode()).unwrap(), with);

        let without = AckMessage {
            ackno: None,
            window_size: 65535,
            rst: true,
        };
        assert_eq!(AckMessage::decode(&without.encode()).unwrap(), without);
    }

    #[test]
    fn ack_default_is_empty() {
        let msg = AckMessage::default();
        assert_eq!(msg.ackno, None);
        assert_eq!(msg.window_size, 0);
        assert!(!msg.rst);
    }

    #[test]
    fn ack_decode_wrong_length() {
        assert_eq!(
            AckMessage::decode(&[0u8; 3]),
            Err(CodecError::BufferTooShort)
        );
        assert_eq!(
            AckMessage::decode(&[0u8; ACK_MESSAGE_LEN + 1]),
            Err(CodecError::LengthMismatch)
        );
    }
}
