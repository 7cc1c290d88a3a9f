//! Deterministic network simulator for exercising the reliability logic.
//!
//! Real networks drop, reorder, and duplicate segments.  [`Simulator`] is a
//! pure in-memory channel that applies a configurable fault model between a
//! sender and a receiver, one instance per direction:
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Loss        | Drop a message with probability `loss_rate`.         |
//! | Duplication | Deliver a message twice with `duplicate_rate`.       |
//! | Reordering  | Insert at a random queue position with `reorder_rate`.|
//!
//! Faults are drawn from a seeded RNG, so any failing test reproduces from
//! its seed.  There is no real time and no I/O here: the driving loop calls
//! [`Simulator::push`] with outbound messages and [`Simulator::pop`] to
//! collect whatever the "network" delivers next.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault-injection model.
///
/// All rates are probabilities in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given message is silently dropped.
    pub loss_rate: f64,
    /// Probability that a message is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a delivery lands at a random queue position
    /// instead of the back.
    pub reorder_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
        }
    }
}

/// A fault-injecting, single-direction message channel.
#[derive(Debug)]
pub struct Simulator<T: Clone> {
    config: SimulatorConfig,
    rng: StdRng,
    in_transit: VecDeque<T>,
}

impl<T: Clone> Simulator<T> {
    /// Create a simulator with the given fault model and RNG seed.
    pub fn new(config: SimulatorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_transit: VecDeque::new(),
        }
    }

    /// A transparent channel with no faults.
    pub fn lossless() -> Self {
        Self::new(SimulatorConfig::default(), 0)
    }

    /// Hand a message to the network.
    pub fn push(&mut self, message: T) {
        if self.rng.gen_bool(self.config.loss_rate) {
            return;
        }
        let copies = 1 + usize::from(self.rng.gen_bool(self.config.duplicate_rate));
        for _ in 0..copies {
            if self.rng.gen_bool(self.config.reorder_rate) && !self.in_transit.is_empty() {
                let position = self.rng.gen_range(0..=self.in_transit.len());
                self.in_transit.insert(position, message.clone());
            } else {
                self.in_transit.push_back(message.clone());
            }
        }
    }

    /// Take the next delivered message, if any.
    pub fn pop(&mut self) -> Option<T> {
        self.in_transit.pop_front()
    }

    /// Messages currently in transit.
    pub fn in_transit(&self) -> usize {
        self.in_transit.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
