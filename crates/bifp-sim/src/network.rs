//! Simulated message network.
//!
//! Every broadcast is encoded once and fanned out as one envelope per
//! recipient. Delivery order is chosen by the seeded RNG, so the same seed
//! always yields the same interleaving. Envelopes may be dropped or
//! duplicated on the way in.

use bytes::Bytes;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Fault probabilities applied to each envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Probability an envelope is lost.
    pub drop_probability: f64,
    /// Probability an envelope is delivered twice.
    pub duplicate_probability: f64,
}

impl NetworkConfig {
    /// Reliable network: no drops, no duplicates. Order is still shuffled.
    pub fn reliable() -> Self {
        Self {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
        }
    }

    pub fn with_drop_probability(mut self, probability: f64) -> Self {
        self.drop_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_duplicate_probability(mut self, probability: f64) -> Self {
        self.duplicate_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::reliable()
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// An encoded message addressed to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: usize,
    pub to: usize,
    pub payload: Bytes,
}

/// Network counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub delivered: u64,
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug)]
pub struct SimNetwork {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    in_flight: Vec<Envelope>,
    stats: NetworkStats,
}

impl SimNetwork {
    pub fn new(config: NetworkConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            rng,
            in_flight: Vec::new(),
            stats: NetworkStats::default(),
        }
    }

    /// Queues `payload` from `from` to every node in `0..nodes` except the
    /// sender itself.
    pub fn broadcast(&mut self, from: usize, nodes: usize, payload: &Bytes) {
        for to in (0..nodes).filter(|&to| to != from) {
            self.send(from, to, payload.clone());
        }
    }

    /// Queues one envelope, subject to drop and duplication.
    pub fn send(&mut self, from: usize, to: usize, payload: Bytes) {
        self.stats.sent += 1;

        if self.config.drop_probability > 0.0 && self.rng.gen_bool(self.config.drop_probability) {
            self.stats.dropped += 1;
            tracing::trace!(from, to, "envelope dropped");
            return;
        }

        if self.config.duplicate_probability > 0.0
            && self.rng.gen_bool(self.config.duplicate_probability)
        {
            self.stats.duplicated += 1;
            self.in_flight.push(Envelope {
                from,
                to,
                payload: payload.clone(),
            });
        }

        self.in_flight.push(Envelope { from, to, payload });
    }

    /// Takes a randomly chosen in-flight envelope.
    pub fn next_delivery(&mut self) -> Option<Envelope> {
        if self.in_flight.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.in_flight.len());
        self.stats.delivered += 1;
        Some(self.in_flight.swap_remove(index))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Mutable access to the network RNG, for scenario decisions that must
    /// share the same deterministic stream.
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn network(config: NetworkConfig, seed: u64) -> SimNetwork {
        SimNetwork::new(config, ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn broadcast_skips_sender() {
        let mut net = network(NetworkConfig::reliable(), 1);
        net.broadcast(2, 4, &Bytes::from_static(b"vote"));

        assert_eq!(net.in_flight(), 3);
        let mut recipients = Vec::new();
        while let Some(envelope) = net.next_delivery() {
            assert_eq!(envelope.from, 2);
            recipients.push(envelope.to);
        }
        recipients.sort_unstable();
        assert_eq!(recipients, vec![0, 1, 3]);
        assert_eq!(net.stats().delivered, 3);
    }

    #[test]
    fn full_drop_probability_loses_everything() {
        let mut net = network(NetworkConfig::reliable().with_drop_probability(1.0), 7);
        net.broadcast(0, 5, &Bytes::from_static(b"vote"));

        assert!(net.is_idle());
        assert_eq!(net.stats().dropped, 4);
    }

    #[test]
    fn full_duplicate_probability_doubles_everything() {
        let mut net = network(NetworkConfig::reliable().with_duplicate_probability(1.0), 7);
        net.broadcast(0, 3, &Bytes::from_static(b"vote"));

        assert_eq!(net.in_flight(), 4);
        assert_eq!(net.stats().duplicated, 2);
    }

    #[test]
    fn delivery_order_is_seeded() {
        let order = |seed| {
            let mut net = network(NetworkConfig::reliable(), seed);
            net.broadcast(0, 8, &Bytes::from_static(b"vote"));
            std::iter::from_fn(|| net.next_delivery().map(|e| e.to)).collect::<Vec<_>>()
        };

        assert_eq!(order(99), order(99));
    }
}
