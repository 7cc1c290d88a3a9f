//! `reliable-transport` — a flow-controlled, retransmitting, in-order byte
//! stream over an unreliable, reorder-and-duplicate-prone segment network.
//!
//! # Architecture
//!
//! ```text
//!  application bytes                        application bytes
//!        │                                        ▲
//!  ┌─────▼──────┐                          ┌──────┴─────┐
//!  │ ByteStream │ (outbound)               │ ByteStream │ (inbound)
//!  └─────┬──────┘                          └──────▲─────┘
//!        │ read                                   │ in-order prefix
//!  ┌─────▼──────┐   segments    ┌──────────┐ ┌────┴────────┐
//!  │   Sender   │──────────────▶│ Receiver │─▶ Reassembler │
//!  └─────▲──────┘               └────┬─────┘ └─────────────┘
//!        │          acks             │
//!        └───────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`byte_stream`]  — bounded FIFO with split write/read capabilities
//! - [`wrap32`]       — 32-bit wrap-around sequence-number arithmetic
//! - [`reassembler`]  — out-of-order range merge, in-order delivery
//! - [`segment`]      — wire format (serialise / deserialise)
//! - [`receiver`]     — inbound segments → stream; acks/window out
//! - [`sender`]       — windowed segmentation, RTO retransmission
//! - [`simulator`]    — lossy/reordering fault model for tests
//!
//! # Driven design
//!
//! Every component is a synchronous, single-threaded state machine: no
//! internal timers, no sockets, no blocking.  A driving loop feeds events
//! in (`push` / `receive` / `insert` calls, and `tick` calls carrying
//! elapsed time) and passes a `transmit` callback to collect outgoing
//! segments.  Link- and IP-layer concerns (framing, address resolution,
//! forwarding, checksums) belong to the layer below and never appear here.
//!
//! Errors are protocol state, not exceptions: a reset marks the affected
//! stream with a permanent error flag.  Out-of-window or unplaceable input
//! is silently discarded; on an unreliable network it is routine, and it
//! must never crash or deadlock the state machine.

pub mod byte_stream;
pub mod reassembler;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod simulator;
pub mod wrap32;

pub use byte_stream::ByteStream;
pub use reassembler::Reassembler;
pub use receiver::Receiver;
pub use segment::{AckMessage, Segment};
pub use sender::{Sender, SenderConfig};
pub use wrap32::Wrap32;
