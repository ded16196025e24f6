//! Fault vote bookkeeping.
//!
//! Votes are keyed by `(reason, instance)`. Each record maps a validator to
//! the number of votes seen from it. Counts are kept for observability and
//! idempotence only: certification looks at the number of **distinct**
//! validators, so a validator re-voting never inflates the tally.
//!
//! # State per `(reason, instance)`
//!
//! ```text
//! ┌────────┐  first vote  ┌─────────┐  Qth distinct voter  ┌───────────┐
//! │ Absent │ ───────────> │ Pending │ ───────────────────> │ Certified │
//! └────────┘              └─────────┘                      └───────────┘
//!      ^                       │                                 │
//!      │   restore / purge     │          removal + purge        │
//!      └───────────────────────┴─────────────────────────────────┘
//! ```
//!
//! `Certified` is transient: the processor removes the replica and purges
//! every record for the instance in the same step.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{FaultReason, InstanceId, ValidatorId};

// ============================================================================
// Vote Record
// ============================================================================

/// Votes for one `(reason, instance)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteRecord {
    votes: BTreeMap<ValidatorId, u64>,
}

impl VoteRecord {
    /// Number of distinct validators with at least one vote.
    pub fn distinct_voters(&self) -> usize {
        self.votes.len()
    }

    /// Number of votes received from `validator`.
    pub fn count_for(&self, validator: &ValidatorId) -> u64 {
        self.votes.get(validator).copied().unwrap_or(0)
    }

    /// Returns true if `validator` has voted.
    pub fn contains(&self, validator: &ValidatorId) -> bool {
        self.votes.contains_key(validator)
    }

    /// Iterates voters and their counts in identity order.
    pub fn voters(&self) -> impl Iterator<Item = (&ValidatorId, u64)> {
        self.votes.iter().map(|(v, c)| (v, *c))
    }

    fn add(&mut self, validator: &ValidatorId) -> bool {
        match self.votes.get_mut(validator) {
            Some(count) => {
                *count = count.saturating_add(1);
                false
            }
            None => {
                self.votes.insert(validator.clone(), 1);
                true
            }
        }
    }
}

/// Observable state of a `(reason, instance)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    /// No votes recorded.
    Absent,

    /// At least one distinct voter, below threshold.
    Pending { distinct_voters: usize },
}

// ============================================================================
// Fault Vote Tracker
// ============================================================================

/// Owned vote table for a single node.
#[derive(Debug, Clone, Default)]
pub struct FaultVoteTracker {
    records: BTreeMap<(FaultReason, InstanceId), VoteRecord>,
}

impl FaultVoteTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one vote from `validator` and returns the number of distinct
    /// voters for `(reason, instance)` afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `instance` is the master instance. Callers validate first.
    pub fn record(
        &mut self,
        reason: FaultReason,
        instance: InstanceId,
        validator: &ValidatorId,
    ) -> usize {
        // PRODUCTION ASSERTION: the master instance never accumulates votes
        assert!(
            instance.is_backup(),
            "vote recorded for master instance (reason {reason}, from {validator})"
        );

        let record = self.records.entry((reason, instance)).or_default();
        let new_voter = record.add(validator);

        tracing::trace!(
            instance = %instance,
            reason = %reason,
            validator = %validator,
            new_voter,
            distinct = record.distinct_voters(),
            count = record.count_for(validator),
            "fault vote recorded"
        );

        record.distinct_voters()
    }

    /// Returns true if `(reason, instance)` has at least `threshold`
    /// distinct voters.
    pub fn reaches(&self, reason: FaultReason, instance: InstanceId, threshold: usize) -> bool {
        self.distinct_voters(reason, instance) >= threshold
    }

    /// Number of distinct voters for `(reason, instance)`.
    pub fn distinct_voters(&self, reason: FaultReason, instance: InstanceId) -> usize {
        self.records
            .get(&(reason, instance))
            .map_or(0, VoteRecord::distinct_voters)
    }

    /// Votes received from `validator` for `(reason, instance)`.
    pub fn vote_count(
        &self,
        reason: FaultReason,
        instance: InstanceId,
        validator: &ValidatorId,
    ) -> u64 {
        self.records
            .get(&(reason, instance))
            .map_or(0, |r| r.count_for(validator))
    }

    /// Returns the record for `(reason, instance)`, if any.
    pub fn record_for(&self, reason: FaultReason, instance: InstanceId) -> Option<&VoteRecord> {
        self.records.get(&(reason, instance))
    }

    /// Returns the state of `(reason, instance)`.
    pub fn state(&self, reason: FaultReason, instance: InstanceId) -> VoteState {
        match self.records.get(&(reason, instance)) {
            Some(record) => VoteState::Pending {
                distinct_voters: record.distinct_voters(),
            },
            None => VoteState::Absent,
        }
    }

    /// Removes every record for `instance` across all reasons.
    ///
    /// Returns the number of records removed.
    pub fn purge_instance(&mut self, instance: InstanceId) -> usize {
        let before = self.records.len();
        self.records.retain(|(_, id), _| *id != instance);
        before - self.records.len()
    }

    /// Removes every record. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Instances with at least one record under any reason.
    pub fn instances(&self) -> BTreeSet<InstanceId> {
        self.records.keys().map(|(_, id)| *id).collect()
    }

    /// Number of `(reason, instance)` records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEGRADED: FaultReason = FaultReason::BackupPrimaryDegraded;
    const DISCONNECTED: FaultReason = FaultReason::BackupPrimaryDisconnected;

    fn node(i: usize) -> ValidatorId {
        ValidatorId::new(format!("Node{i}"))
    }

    #[test]
    fn first_vote_creates_pending_record() {
        let mut tracker = FaultVoteTracker::new();
        let one = InstanceId::new(1);

        assert_eq!(tracker.state(DEGRADED, one), VoteState::Absent);
        assert_eq!(tracker.record(DEGRADED, one, &node(1)), 1);
        assert_eq!(
            tracker.state(DEGRADED, one),
            VoteState::Pending { distinct_voters: 1 }
        );
    }

    #[test]
    fn repeat_votes_increment_count_only() {
        let mut tracker = FaultVoteTracker::new();
        let one = InstanceId::new(1);

        for _ in 0..5 {
            assert_eq!(tracker.record(DEGRADED, one, &node(1)), 1);
        }

        assert_eq!(tracker.distinct_voters(DEGRADED, one), 1);
        assert_eq!(tracker.vote_count(DEGRADED, one, &node(1)), 5);
        assert!(!tracker.reaches(DEGRADED, one, 2));
    }

    #[test]
    fn reasons_are_separate_namespaces() {
        let mut tracker = FaultVoteTracker::new();
        let one = InstanceId::new(1);

        tracker.record(DEGRADED, one, &node(1));
        tracker.record(DISCONNECTED, one, &node(2));

        assert_eq!(tracker.distinct_voters(DEGRADED, one), 1);
        assert_eq!(tracker.distinct_voters(DISCONNECTED, one), 1);
        assert!(!tracker.reaches(DEGRADED, one, 2));
    }

    #[test]
    fn purge_instance_spans_reasons() {
        let mut tracker = FaultVoteTracker::new();
        let one = InstanceId::new(1);
        let two = InstanceId::new(2);

        tracker.record(DEGRADED, one, &node(1));
        tracker.record(DISCONNECTED, one, &node(1));
        tracker.record(DISCONNECTED, two, &node(3));

        assert_eq!(tracker.purge_instance(one), 2);
        assert_eq!(tracker.state(DEGRADED, one), VoteState::Absent);
        assert_eq!(tracker.state(DISCONNECTED, one), VoteState::Absent);
        assert_eq!(tracker.distinct_voters(DISCONNECTED, two), 1);
        assert_eq!(tracker.instances(), BTreeSet::from([two]));
    }

    #[test]
    fn clear_empties_tracker() {
        let mut tracker = FaultVoteTracker::new();
        tracker.record(DEGRADED, InstanceId::new(1), &node(1));
        tracker.record(DISCONNECTED, InstanceId::new(2), &node(1));

        assert_eq!(tracker.clear(), 2);
        assert!(tracker.is_empty());
        assert_eq!(tracker.clear(), 0);
    }

    #[test]
    #[should_panic(expected = "master instance")]
    fn master_vote_panics() {
        let mut tracker = FaultVoteTracker::new();
        tracker.record(DEGRADED, InstanceId::MASTER, &node(1));
    }

    proptest! {
        /// Property: distinct voters equals the size of the set of senders,
        /// whatever the order and multiplicity of their votes.
        #[test]
        fn prop_distinct_voters_ignores_repeats(
            senders in proptest::collection::vec(0_usize..12, 0..64),
        ) {
            let mut tracker = FaultVoteTracker::new();
            let one = InstanceId::new(1);

            for s in &senders {
                tracker.record(DISCONNECTED, one, &node(*s));
            }

            let unique: BTreeSet<_> = senders.iter().collect();
            prop_assert_eq!(tracker.distinct_voters(DISCONNECTED, one), unique.len());

            for s in &unique {
                let expected = senders.iter().filter(|x| x == s).count() as u64;
                prop_assert_eq!(tracker.vote_count(DISCONNECTED, one, &node(**s)), expected);
            }
        }

        /// Property: Q-1 validators never reach Q regardless of repeats.
        #[test]
        fn prop_below_threshold_never_reaches(
            threshold in 2_usize..10,
            repeats in 1_usize..6,
        ) {
            let mut tracker = FaultVoteTracker::new();
            let one = InstanceId::new(1);

            for _ in 0..repeats {
                for v in 0..threshold - 1 {
                    tracker.record(DEGRADED, one, &node(v));
                }
            }

            prop_assert!(!tracker.reaches(DEGRADED, one, threshold));
            tracker.record(DEGRADED, one, &node(threshold));
            prop_assert!(tracker.reaches(DEGRADED, one, threshold));
        }
    }
}
