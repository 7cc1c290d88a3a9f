//! Bounded in-order byte buffer with split write/read capabilities.
//!
//! A [`ByteStream`] is the hand-off point between the application and the
//! transport machinery: the outbound stream is written by the application
//! and drained by the sender; the inbound stream is written by the
//! reassembler and drained by the application.
//!
//! # Contract
//!
//! - Capacity is fixed at construction.  `push` accepts at most
//!   `available_capacity()` bytes and **silently discards** the rest; a
//!   bounded producer never blocks and never errors on overflow.
//! - `bytes_pushed()` and `bytes_popped()` count the whole lifetime of the
//!   stream and never decrease; `bytes_pushed - bytes_popped` is exactly
//!   what is buffered and never exceeds capacity.
//! - `close()` means "no more bytes will ever be pushed"; the stream is
//!   *finished* once it is closed **and** drained.
//! - `set_error()` marks a permanent failure (a connection reset).  It is
//!   observable from both ends and never clears.
//! - Storage is chunked: [`Reader::peek`] returns the longest *contiguous*
//!   run, which may be shorter than `bytes_buffered()`.  Re-peek after a
//!   partial pop.
//!
//! The two capability structs, [`Writer`] and [`Reader`], expose disjoint
//! mutation sets over the same stream, so the writing owner (application
//! or reassembler) and the reading owner (sender or application) cannot
//! step on each other's operations.  No operation blocks.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// ByteStream
// ---------------------------------------------------------------------------

/// A fixed-capacity FIFO of bytes with close and error signaling.
#[derive(Debug)]
pub struct ByteStream {
    capacity: usize,
    /// Buffered chunks in push order; only the front chunk is partially
    /// consumed.
    chunks: VecDeque<Vec<u8>>,
    /// Bytes of the front chunk that have already been popped.
    front_skip: usize,
    buffered: usize,
    pushed: u64,
    popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    /// Create an empty stream that can buffer up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chunks: VecDeque::new(),
            front_skip: 0,
            buffered: 0,
            pushed: 0,
            popped: 0,
            closed: false,
            error: false,
        }
    }

    /// Borrow the write capability.
    pub fn writer(&mut self) -> Writer<'_> {
        Writer { stream: self }
    }

    /// Borrow the read capability.
    pub fn reader(&mut self) -> Reader<'_> {
        Reader { stream: self }
    }

    /// Maximum number of bytes this stream can hold at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Room left for new bytes right now.
    pub fn available_capacity(&self) -> usize {
        self.capacity - self.buffered
    }

    /// Bytes currently buffered (pushed but not yet popped).
    pub fn bytes_buffered(&self) -> usize {
        self.buffered
    }

    /// Total bytes ever accepted by `push`.
    pub fn bytes_pushed(&self) -> u64 {
        self.pushed
    }

    /// Total bytes ever removed by `pop`.
    pub fn bytes_popped(&self) -> u64 {
        self.popped
    }

    /// `true` once the writing side has called `close`.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `true` when the stream is closed and fully drained.
    pub fn is_finished(&self) -> bool {
        self.closed && self.buffered == 0
    }

    /// `true` once a permanent error has been signaled.
    pub fn has_error(&self) -> bool {
        self.error
    }
}

// ---------------------------------------------------------------------------
// Writer capability
// ---------------------------------------------------------------------------

/// Write half of a [`ByteStream`]: push, close, signal error.
#[derive(Debug)]
pub struct Writer<'a> {
    stream: &'a mut ByteStream,
}

impl Writer<'_> {
    /// Append as much of `data` as fits; the remainder is discarded.
    pub fn push(&mut self, mut data: Vec<u8>) {
        let s = &mut *self.stream;
        let len = data.len().min(s.capacity - s.buffered);
        if len == 0 {
            return;
        }
        data.truncate(len);
        s.buffered += len;
        s.pushed += len as u64;
        s.chunks.push_back(data);
    }

    /// Declare that no further bytes will be pushed.  Idempotent.
    pub fn close(&mut self) {
        self.stream.closed = true;
    }

    /// Signal a permanent error (e.g. a connection reset).  Idempotent.
    pub fn set_error(&mut self) {
        self.stream.error = true;
    }

    /// Room left for new bytes right now.
    pub fn available_capacity(&self) -> usize {
        self.stream.available_capacity()
    }

    /// Total bytes ever accepted by `push`.
    pub fn bytes_pushed(&self) -> u64 {
        self.stream.bytes_pushed()
    }

    /// `true` once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    /// `true` once a permanent error has been signaled.
    pub fn has_error(&self) -> bool {
        self.stream.has_error()
    }
}

// ---------------------------------------------------------------------------
// Reader capability
// ---------------------------------------------------------------------------

/// Read half of a [`ByteStream`]: peek and pop.
#[derive(Debug)]
pub struct Reader<'a> {
    stream: &'a mut ByteStream,
}

impl Reader<'_> {
    /// The longest contiguous run of buffered bytes.
    ///
    /// May be shorter than [`bytes_buffered`](Self::bytes_buffered) because
    /// storage is chunked; call again after popping to see the next run.
    pub fn peek(&self) -> &[u8] {
        match self.stream.chunks.front() {
            Some(chunk) => &chunk[self.stream.front_skip..],
            None => &[],
        }
    }

    /// Remove up to `len` bytes from the front of the stream.
    pub fn pop(&mut self, len: usize) {
        let s = &mut *self.stream;
        let mut remaining = len.min(s.buffered);
        s.buffered -= remaining;
        s.popped += remaining as u64;

        while remaining > 0 {
            let Some(front) = s.chunks.front() else { break };
            let front_len = front.len() - s.front_skip;
            if remaining >= front_len {
                remaining -= front_len;
                s.chunks.pop_front();
                s.front_skip = 0;
            } else {
                s.front_skip += remaining;
                remaining = 0;
            }
        }
    }

    /// Pop up to `len` bytes and return them as an owned buffer.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.min(self.stream.buffered));
        while out.len() < len {
            let chunk = self.peek();
            if chunk.is_empty() {
                break;
            }
            let take = (len - out.len()).min(chunk.len());
            out.extend_from_slice(&chunk[..take]);
            self.pop(take);
        }
        out
    }

    /// Bytes currently buffered and readable.
    pub fn bytes_buffered(&self) -> usize {
        self.stream.bytes_buffered()
    }

    /// Total bytes ever removed by `pop`.
    pub fn bytes_popped(&self) -> u64 {
        self.stream.bytes_popped()
    }

    /// `true` when the stream is closed and fully drained.
    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }

    /// `true` once a permanent error has been signaled.
    pub fn has_error(&self) -> bool {
        self.stream.has_error()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
