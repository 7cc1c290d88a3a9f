//! Out-of-order byte-range reassembly.
//!
//! The network may deliver stream slices in any order, duplicated, and
//! overlapping.  [`Reassembler`] accepts ranges tagged with their absolute
//! stream offset and feeds its output [`ByteStream`] only the contiguous
//! in-order prefix, holding everything else in a sorted pending map.
//!
//! # Contract
//!
//! - The reassembler owns the write half of its output stream for its whole
//!   life; nothing else ever writes to that stream.
//! - Pending ranges never overlap, and every one of them fit inside
//!   `[next_index, next_index + available_capacity)` of the output at the
//!   moment it was accepted, so total buffering is bounded by the output's
//!   capacity, never by the peer's behavior.
//! - Bytes outside the acceptance window are **silently discarded**; on an
//!   unreliable network they are routine, not errors.
//! - Inserting the same range twice is indistinguishable from inserting it
//!   once.
//! - The output is closed exactly when every byte up to the flagged final
//!   offset has been delivered.

use std::collections::BTreeMap;

use crate::byte_stream::{ByteStream, Reader};

/// Reorders arbitrary stream slices into an in-order byte stream.
#[derive(Debug)]
pub struct Reassembler {
    output: ByteStream,
    /// Absolute offset of the next byte the output expects.
    next_index: u64,
    /// One past the final byte of the stream, latched by the first range
    /// flagged as last.  Never moves once set.
    end_index: Option<u64>,
    /// Buffered out-of-order ranges keyed by absolute start offset.
    /// Non-overlapping; all starts are > `next_index`.
    pending: BTreeMap<u64, Vec<u8>>,
    /// Sum of the lengths of all pending ranges.
    pending_bytes: u64,
}

impl Reassembler {
    /// Create a reassembler writing into `output`.
    pub fn new(output: ByteStream) -> Self {
        Self {
            output,
            next_index: 0,
            end_index: None,
            pending: BTreeMap::new(),
            pending_bytes: 0,
        }
    }

    /// Accept the slice of the stream starting at absolute offset
    /// `first_index`.  `is_last_substring` marks the slice that ends the
    /// stream.
    ///
    /// Slices may arrive in any order, duplicated, or overlapping; whatever
    /// does not fit the output's remaining capacity is discarded.
    pub fn insert(&mut self, first_index: u64, data: Vec<u8>, is_last_substring: bool) {
        if self.output.is_closed() || self.output.has_error() {
            return;
        }

        if is_last_substring && self.end_index.is_none() {
            self.end_index = Some(first_index + data.len() as u64);
            log::debug!(
                "[reassembler] stream end latched at index {}",
                first_index + data.len() as u64
            );
        }

        if !data.is_empty() {
            self.store(first_index, data);
            self.flush();
        }
        self.try_close();
    }

    /// Total bytes buffered but not yet delivered to the output.
    pub fn bytes_pending(&self) -> u64 {
        self.pending_bytes
    }

    /// The assembled output stream.
    pub fn output(&self) -> &ByteStream {
        &self.output
    }

    /// Read capability of the output stream, for draining assembled bytes.
    pub fn reader(&mut self) -> Reader<'_> {
        self.output.reader()
    }

    /// Signal a permanent error on the output stream.
    pub fn set_error(&mut self) {
        self.output.writer().set_error();
    }

    /// Clip `data` to the acceptance window, merge it against the pending
    /// ranges, and store the surviving slice.
    fn store(&mut self, first_index: u64, mut data: Vec<u8>) {
        let data_end = first_index + data.len() as u64;
        let window_end = self.next_index + self.output.available_capacity() as u64;

        // Entirely consumed already, or entirely beyond the window.
        if data_end <= self.next_index || first_index >= window_end {
            return;
        }

        let mut start = self.next_index.max(first_index);
        let mut end = window_end.min(data_end);

        // A preceding range that extends past `start` owns those bytes.
        if let Some((pre_start, pre_data)) = self.pending.range(..start).next_back() {
            start = start.max(pre_start + pre_data.len() as u64);
        }

        // Following ranges wholly inside [start, end) are superseded; the
        // first one reaching past `end` keeps its bytes and clips us.
        let mut superseded = Vec::new();
        for (&other_start, other_data) in self.pending.range(start..) {
            if other_start + other_data.len() as u64 > end {
                end = end.min(other_start);
                break;
            }
            superseded.push(other_start);
        }
        for key in superseded {
            if let Some(removed) = self.pending.remove(&key) {
                self.pending_bytes -= removed.len() as u64;
            }
        }

        if start >= end {
            return;
        }

        data.truncate((end - first_index) as usize);
        let slice = data.split_off((start - first_index) as usize);
        self.pending_bytes += slice.len() as u64;
        self.pending.insert(start, slice);
    }

    /// Push the contiguous prefix of the pending map into the output.
    fn flush(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > self.next_index {
                break;
            }
            let index = *entry.key();
            let mut bytes = entry.remove();
            self.pending_bytes -= bytes.len() as u64;

            // Only the portion at or after `next_index` is pushed.
            let skip = (self.next_index - index) as usize;
            if skip >= bytes.len() {
                continue;
            }
            bytes.drain(..skip);

            self.next_index += bytes.len() as u64;
            self.output.writer().push(bytes);
        }
    }

    /// Close the output once every byte up to the known end is delivered.
    fn try_close(&mut self) {
        if self.end_index == Some(self.next_index) {
            self.output.writer().close();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
