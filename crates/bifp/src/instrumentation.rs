//! Process-wide counters for the fault protocol.
//!
//! Counters are lock-free atomics so they can be bumped from the message
//! path without contention. Export is left to the host: call
//! [`Metrics::snapshot`] and ship the result wherever the node reports.
//!
//! ```ignore
//! use bifp::instrumentation::METRICS;
//!
//! let snapshot = METRICS.snapshot();
//! println!("{}", snapshot.quorum_removals);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::message::Rejection;

/// Global metrics instance.
pub static METRICS: Metrics = Metrics::new();

/// Counters for votes, removals and restorations.
#[derive(Debug)]
pub struct Metrics {
    // === Votes ===
    votes_recorded_total: AtomicU64,
    votes_skipped_inactive_total: AtomicU64,
    broadcasts_total: AtomicU64,

    // === Rejections (by class) ===
    rejected_empty_instances: AtomicU64,
    rejected_view_mismatch: AtomicU64,
    rejected_master_instance: AtomicU64,
    rejected_unknown_reason: AtomicU64,
    rejected_not_quorum_strategy: AtomicU64,

    // === Replica lifecycle ===
    local_removals_total: AtomicU64,
    quorum_removals_total: AtomicU64,
    restorations_total: AtomicU64,
    replicas_restored_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a zeroed metrics instance.
    pub const fn new() -> Self {
        Self {
            votes_recorded_total: AtomicU64::new(0),
            votes_skipped_inactive_total: AtomicU64::new(0),
            broadcasts_total: AtomicU64::new(0),
            rejected_empty_instances: AtomicU64::new(0),
            rejected_view_mismatch: AtomicU64::new(0),
            rejected_master_instance: AtomicU64::new(0),
            rejected_unknown_reason: AtomicU64::new(0),
            rejected_not_quorum_strategy: AtomicU64::new(0),
            local_removals_total: AtomicU64::new(0),
            quorum_removals_total: AtomicU64::new(0),
            restorations_total: AtomicU64::new(0),
            replicas_restored_total: AtomicU64::new(0),
        }
    }

    pub fn increment_votes_recorded(&self) {
        self.votes_recorded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_votes_skipped_inactive(&self) {
        self.votes_skipped_inactive_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_broadcasts(&self) {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_local_removals(&self) {
        self.local_removals_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_quorum_removals(&self) {
        self.quorum_removals_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one restoration pass that re-added `replicas` instances.
    pub fn record_restoration(&self, replicas: usize) {
        self.restorations_total.fetch_add(1, Ordering::Relaxed);
        self.replicas_restored_total
            .fetch_add(replicas as u64, Ordering::Relaxed);
    }

    /// Counts a dropped inbound vote under its rejection class.
    pub fn record_rejection(&self, rejection: &Rejection) {
        let counter = match rejection {
            Rejection::EmptyInstances => &self.rejected_empty_instances,
            Rejection::ViewMismatch { .. } => &self.rejected_view_mismatch,
            Rejection::MasterInstance => &self.rejected_master_instance,
            Rejection::UnknownReason(_) => &self.rejected_unknown_reason,
            Rejection::NotQuorumStrategy(_) => &self.rejected_not_quorum_strategy,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            votes_recorded: self.votes_recorded_total.load(Ordering::Relaxed),
            votes_skipped_inactive: self.votes_skipped_inactive_total.load(Ordering::Relaxed),
            broadcasts: self.broadcasts_total.load(Ordering::Relaxed),
            rejected_empty_instances: self.rejected_empty_instances.load(Ordering::Relaxed),
            rejected_view_mismatch: self.rejected_view_mismatch.load(Ordering::Relaxed),
            rejected_master_instance: self.rejected_master_instance.load(Ordering::Relaxed),
            rejected_unknown_reason: self.rejected_unknown_reason.load(Ordering::Relaxed),
            rejected_not_quorum_strategy: self
                .rejected_not_quorum_strategy
                .load(Ordering::Relaxed),
            local_removals: self.local_removals_total.load(Ordering::Relaxed),
            quorum_removals: self.quorum_removals_total.load(Ordering::Relaxed),
            restorations: self.restorations_total.load(Ordering::Relaxed),
            replicas_restored: self.replicas_restored_total.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`Metrics`] for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub votes_recorded: u64,
    pub votes_skipped_inactive: u64,
    pub broadcasts: u64,
    pub rejected_empty_instances: u64,
    pub rejected_view_mismatch: u64,
    pub rejected_master_instance: u64,
    pub rejected_unknown_reason: u64,
    pub rejected_not_quorum_strategy: u64,
    pub local_removals: u64,
    pub quorum_removals: u64,
    pub restorations: u64,
    pub replicas_restored: u64,
}

impl MetricsSnapshot {
    /// Total dropped inbound votes across all rejection classes.
    pub fn rejected_total(&self) -> u64 {
        self.rejected_empty_instances
            + self.rejected_view_mismatch
            + self.rejected_master_instance
            + self.rejected_unknown_reason
            + self.rejected_not_quorum_strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ViewNumber;

    #[test]
    fn rejections_counted_by_class() {
        let metrics = Metrics::new();
        metrics.record_rejection(&Rejection::EmptyInstances);
        metrics.record_rejection(&Rejection::ViewMismatch {
            expected: ViewNumber::ZERO,
            received: ViewNumber::new(1),
        });
        metrics.record_rejection(&Rejection::ViewMismatch {
            expected: ViewNumber::ZERO,
            received: ViewNumber::new(2),
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rejected_empty_instances, 1);
        assert_eq!(snapshot.rejected_view_mismatch, 2);
        assert_eq!(snapshot.rejected_total(), 3);
    }

    #[test]
    fn restoration_counts_pass_and_replicas() {
        let metrics = Metrics::new();
        metrics.record_restoration(2);
        metrics.record_restoration(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.restorations, 2);
        assert_eq!(snapshot.replicas_restored, 2);
    }
}
