//! Inbound half of a connection: segments in, acknowledgments out.
//!
//! [`Receiver`] translates wire segments into absolute stream offsets and
//! drives its [`Reassembler`]; in the other direction it reports the next
//! expected sequence number and the advertised window.
//!
//! # Sequence-number layout
//!
//! ```text
//!  wire seqno:    ISN   ISN+1  ISN+2  ...        (wraps mod 2^32)
//!  occupied by:   SYN   byte0  byte1  ...  FIN
//!  stream index:         0      1     ...
//! ```
//!
//! The SYN occupies a sequence number but carries no stream byte, so the
//! stream index of a payload is its absolute sequence offset minus one.
//!
//! This module only manages state; moving segments across the network is
//! the caller's responsibility.

use crate::byte_stream::{ByteStream, Reader};
use crate::reassembler::Reassembler;
use crate::segment::{AckMessage, Segment};
use crate::wrap32::Wrap32;

/// Largest window the 16-bit wire field can advertise.  Capacity beyond
/// this is real but invisible to the peer.
const MAX_WINDOW: usize = u16::MAX as usize;

/// Receive-side state for one connection half.
#[derive(Debug)]
pub struct Receiver {
    reassembler: Reassembler,
    /// The peer's initial sequence number; set by the first SYN and never
    /// moved by later ones.
    isn: Option<Wrap32>,
}

impl Receiver {
    /// Create a receiver delivering into `reassembler`'s output stream.
    pub fn new(reassembler: Reassembler) -> Self {
        Self {
            reassembler,
            isn: None,
        }
    }

    /// Process one inbound segment.
    ///
    /// RST propagates a permanent error to the output stream and nothing
    /// else.  Segments arriving before any SYN cannot be positioned in the
    /// stream and are dropped.
    pub fn receive(&mut self, segment: Segment) {
        if segment.rst {
            log::debug!("[receiver] ← RST; erroring output stream");
            self.reassembler.set_error();
            return;
        }

        if segment.syn && self.isn.is_none() {
            self.isn = Some(segment.seqno);
            log::debug!("[receiver] ← SYN, isn={}", segment.seqno.raw());
        }
        let Some(isn) = self.isn else {
            return;
        };

        // Anchor unwrapping at confirmed progress: delivered bytes are
        // always within one window of any in-flight seqno.
        let checkpoint = self.reassembler.output().bytes_pushed();
        let absolute = segment.seqno.unwrap(isn, checkpoint);

        // The SYN slot holds no stream byte; a non-SYN segment claiming
        // that slot has nowhere to land.
        let Some(index) = (absolute + segment.syn as u64).checked_sub(1) else {
            return;
        };

        self.reassembler.insert(index, segment.payload, segment.fin);
    }

    /// The acknowledgment to report to the peer right now.
    ///
    /// `ackno` covers the SYN, every delivered byte, and the FIN once the
    /// stream is complete.  The window is the output's free capacity capped
    /// at the 16-bit wire field.
    pub fn ack_message(&self) -> AckMessage {
        let output = self.reassembler.output();
        if output.has_error() {
            return AckMessage {
                rst: true,
                ..AckMessage::default()
            };
        }

        let window_size = output.available_capacity().min(MAX_WINDOW) as u16;
        let ackno = self
            .isn
            .map(|isn| isn + (output.bytes_pushed() + 1 + output.is_closed() as u64));
        AckMessage {
            ackno,
            window_size,
            rst: false,
        }
    }

    /// Total bytes buffered out of order, awaiting earlier gaps.
    pub fn bytes_pending(&self) -> u64 {
        self.reassembler.bytes_pending()
    }

    /// The assembled inbound stream.
    pub fn stream(&self) -> &ByteStream {
        self.reassembler.output()
    }

    /// Read capability of the inbound stream, for the application to drain.
    pub fn reader(&mut self) -> Reader<'_> {
        self.reassembler.reader()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
