//! 32-bit wrap-around sequence numbers.
//!
//! Stream offsets are unbounded (`u64`), but the wire only carries 32 bits,
//! so sequence numbers wrap roughly every 4 GiB of traffic.  [`Wrap32`]
//! converts between the two representations given:
//!
//! - a **zero point** — the wire value corresponding to absolute offset 0
//!   (the connection's ISN), and
//! - a **checkpoint** — a nearby absolute offset that disambiguates which
//!   2^32-wide block the wire value belongs to.
//!
//! Reconstruction is exact as long as the true absolute offset lies within
//! about 2^31 of the checkpoint, which holds for any bounded-window
//! connection.  This module only does arithmetic; no protocol state lives
//! here.

use std::ops::Add;

/// Width of one sequence-number block (2^32).
const BLOCK: u64 = 1 << 32;

/// A 32-bit sequence number as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrap32(u32);

impl Wrap32 {
    /// Construct from a raw wire value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit wire value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Wrap an absolute stream offset into wire representation.
    ///
    /// Returns `zero_point + n` modulo 2^32.
    pub fn wrap(n: u64, zero_point: Wrap32) -> Self {
        zero_point + n
    }

    /// Recover the absolute offset this wire value represents.
    ///
    /// Among all `u64` values congruent to `self - zero_point` mod 2^32,
    /// picks the one closest to `checkpoint`.  The candidates are the
    /// matching offsets in the checkpoint's block and its two neighbors;
    /// blocks below 0 or above `u64::MAX` simply don't exist as candidates.
    ///
    /// Total: always returns a value, never fails.
    pub fn unwrap(self, zero_point: Wrap32, checkpoint: u64) -> u64 {
        let offset = u64::from(self.0.wrapping_sub(zero_point.0));
        let base = (checkpoint >> 32) << 32;

        let mut best = base + offset;
        let mut best_dist = best.abs_diff(checkpoint);
        let neighbors = [
            base.checked_sub(BLOCK).map(|b| b + offset),
            base.checked_add(BLOCK).map(|b| b + offset),
        ];
        for candidate in neighbors.into_iter().flatten() {
            let dist = candidate.abs_diff(checkpoint);
            if dist < best_dist {
                best = candidate;
                best_dist = dist;
            }
        }
        best
    }
}

impl Add<u64> for Wrap32 {
    type Output = Wrap32;

    /// Advance a wire value by an offset, wrapping modulo 2^32.
    fn add(self, rhs: u64) -> Wrap32 {
        Wrap32(self.0.wrapping_add(rhs as u32))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
