//! Backup instance fault processor.
//!
//! The single authority on this node that turns local suspicions and peer
//! votes into replica removal, and restoration triggers into re-addition.
//!
//! # Flow
//!
//! ```text
//! detector ──on_local_suspicion──► processor
//!                                     │
//!              local strategy ────────┼──► registry.remove_replica
//!                                     │
//!              quorum strategy ───────┼──► gateway.send(BackupInstanceFaulty)
//!                                     │    + own vote
//!                                     ▼
//! peers ──process_inbound_vote──► tracker ──Q distinct──► remove + purge
//!
//! view change ──restore_replicas──► clear votes + registry.add_replica
//! ```
//!
//! Every public operation runs to completion without suspending. Hosts that
//! call in from several threads must go through [`SharedProcessor`].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::StrategyConfig;
use crate::instrumentation::METRICS;
use crate::message::{BackupInstanceFaulty, Rejection, validate};
use crate::quorum::{QuorumCalculator, QuorumKind};
use crate::tracker::{FaultVoteTracker, VoteState};
use crate::traits::{MessageGateway, ReplicaRegistry, ViewSource};
use crate::types::{FaultReason, InstanceId, RemovalStrategy, ValidatorId};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of handling a local suspicion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspicionOutcome {
    /// Nothing to act on: no eligible instances, or the reason is not
    /// configured on this node.
    Ignored,

    /// Replicas removed immediately under the local strategy. Lists only
    /// instances that were running beforehand.
    RemovedLocally(Vec<InstanceId>),

    /// A vote was broadcast for `instances`. `certified` lists those whose
    /// own vote already completed a quorum.
    Broadcast {
        instances: Vec<InstanceId>,
        certified: Vec<InstanceId>,
    },
}

/// Result of handling an inbound vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The message failed admission and was dropped whole.
    Rejected(Rejection),

    /// The message was admitted.
    Accepted {
        /// Instances the sender's vote was recorded for.
        recorded: Vec<InstanceId>,
        /// Instances skipped because they have no running replica.
        skipped: Vec<InstanceId>,
        /// Instances whose quorum this vote completed, now removed.
        certified: Vec<InstanceId>,
    },
}

impl VoteOutcome {
    /// Returns true if the message failed admission.
    pub fn is_rejected(&self) -> bool {
        matches!(self, VoteOutcome::Rejected(_))
    }

    /// Instances removed as a result of this vote.
    pub fn certified(&self) -> &[InstanceId] {
        match self {
            VoteOutcome::Rejected(_) => &[],
            VoteOutcome::Accepted { certified, .. } => certified,
        }
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Quorum-vote aggregation and replica removal/restoration for one node.
#[derive(Debug)]
pub struct BackupFaultProcessor<R, G, Q, V> {
    /// This node's identity, used for its own votes.
    validator: ValidatorId,

    /// Strategy per reason, validated at startup.
    strategies: StrategyConfig,

    registry: R,
    gateway: G,
    quorums: Q,
    view: V,

    /// Pending votes per `(reason, instance)`.
    tracker: FaultVoteTracker,

    /// Instances this processor removed and has not yet restored.
    removed: BTreeSet<InstanceId>,
}

impl<R, G, Q, V> BackupFaultProcessor<R, G, Q, V>
where
    R: ReplicaRegistry,
    G: MessageGateway,
    Q: QuorumCalculator,
    V: ViewSource,
{
    /// Creates a processor with an empty vote table.
    pub fn new(
        validator: ValidatorId,
        strategies: StrategyConfig,
        registry: R,
        gateway: G,
        quorums: Q,
        view: V,
    ) -> Self {
        Self {
            validator,
            strategies,
            registry,
            gateway,
            quorums,
            view,
            tracker: FaultVoteTracker::new(),
            removed: BTreeSet::new(),
        }
    }

    // ========================================================================
    // Local Suspicion
    // ========================================================================

    /// Entry point for the degradation and disconnection detectors.
    ///
    /// Under the local strategy the replicas are removed at once. Under the
    /// quorum strategy this node votes for every still-active instance in a
    /// single broadcast and counts its own vote.
    pub fn on_local_suspicion(
        &mut self,
        reason: FaultReason,
        instances: &[InstanceId],
    ) -> SuspicionOutcome {
        let backups = self.eligible_backups(reason, instances);
        if backups.is_empty() {
            return SuspicionOutcome::Ignored;
        }

        match self.strategies.strategy_for(reason) {
            None => {
                tracing::debug!(
                    validator = %self.validator,
                    reason = %reason,
                    "no removal strategy configured, suspicion ignored"
                );
                SuspicionOutcome::Ignored
            }
            Some(RemovalStrategy::Local) => {
                let mut removed = Vec::with_capacity(backups.len());
                for &instance in &backups {
                    let (taken_down, _) = self.remove(instance);
                    if !taken_down {
                        tracing::debug!(
                            validator = %self.validator,
                            instance = %instance,
                            reason = %reason,
                            "instance had no running replica, not tracked for restoration"
                        );
                        continue;
                    }
                    METRICS.increment_local_removals();
                    tracing::info!(
                        validator = %self.validator,
                        instance = %instance,
                        reason = %reason,
                        "backup replica removed locally"
                    );
                    removed.push(instance);
                }
                SuspicionOutcome::RemovedLocally(removed)
            }
            Some(RemovalStrategy::Quorum) => self.vote(reason, backups),
        }
    }

    /// Detector hook for backup primary performance degradation.
    pub fn on_backup_degradation(&mut self, instances: &[InstanceId]) -> SuspicionOutcome {
        self.on_local_suspicion(FaultReason::BackupPrimaryDegraded, instances)
    }

    /// Detector hook for a disconnected backup primary.
    pub fn on_backup_primary_disconnected(&mut self, instances: &[InstanceId]) -> SuspicionOutcome {
        self.on_local_suspicion(FaultReason::BackupPrimaryDisconnected, instances)
    }

    fn vote(&mut self, reason: FaultReason, backups: Vec<InstanceId>) -> SuspicionOutcome {
        let active: Vec<InstanceId> = backups
            .into_iter()
            .filter(|id| self.registry.is_active(*id))
            .collect();

        if active.is_empty() {
            tracing::debug!(
                validator = %self.validator,
                reason = %reason,
                "suspected instances already inactive, no vote sent"
            );
            return SuspicionOutcome::Ignored;
        }

        let view = self.view.current_view();
        self.gateway.send(BackupInstanceFaulty::new(
            view,
            active.clone(),
            reason,
        ));
        METRICS.increment_broadcasts();

        tracing::info!(
            validator = %self.validator,
            reason = %reason,
            view = %view,
            instances = ?active,
            "broadcast BackupInstanceFaulty"
        );

        let own = self.validator.clone();
        let mut certified = Vec::new();
        for &instance in &active {
            self.tracker.record(reason, instance, &own);
            METRICS.increment_votes_recorded();
            if self.certify_if_reached(reason, instance) {
                certified.push(instance);
            }
        }

        SuspicionOutcome::Broadcast {
            instances: active,
            certified,
        }
    }

    /// Drops the master instance and duplicates, preserving order.
    fn eligible_backups(&self, reason: FaultReason, instances: &[InstanceId]) -> Vec<InstanceId> {
        let mut seen = BTreeSet::new();
        let mut backups = Vec::with_capacity(instances.len());

        for &instance in instances {
            if instance.is_master() {
                tracing::warn!(
                    validator = %self.validator,
                    reason = %reason,
                    "suspicion named the master instance, ignoring it"
                );
                continue;
            }
            if seen.insert(instance) {
                backups.push(instance);
            }
        }

        backups
    }

    // ========================================================================
    // Inbound Votes
    // ========================================================================

    /// Handles a `BackupInstanceFaulty` delivered from `sender`.
    ///
    /// A message failing admission is dropped whole with no state change.
    /// Otherwise the sender's vote is recorded for each listed instance that
    /// still has a running replica, and any instance reaching quorum is
    /// removed.
    pub fn process_inbound_vote(
        &mut self,
        msg: &BackupInstanceFaulty,
        sender: &ValidatorId,
    ) -> VoteOutcome {
        let reason = match validate(msg, self.view.current_view(), &self.strategies) {
            Ok(reason) => reason,
            Err(rejection) => {
                METRICS.record_rejection(&rejection);
                tracing::debug!(
                    validator = %self.validator,
                    from = %sender,
                    view = %msg.view,
                    %rejection,
                    "BackupInstanceFaulty dropped"
                );
                return VoteOutcome::Rejected(rejection);
            }
        };

        let mut seen = BTreeSet::new();
        let mut recorded = Vec::new();
        let mut skipped = Vec::new();
        let mut certified = Vec::new();

        for &instance in &msg.instances {
            if !seen.insert(instance) {
                continue;
            }

            if !self.registry.is_active(instance) {
                METRICS.increment_votes_skipped_inactive();
                tracing::debug!(
                    validator = %self.validator,
                    from = %sender,
                    instance = %instance,
                    reason = %reason,
                    "vote for inactive instance skipped"
                );
                skipped.push(instance);
                continue;
            }

            self.tracker.record(reason, instance, sender);
            METRICS.increment_votes_recorded();
            recorded.push(instance);

            if self.certify_if_reached(reason, instance) {
                certified.push(instance);
            }
        }

        VoteOutcome::Accepted {
            recorded,
            skipped,
            certified,
        }
    }

    /// Removes `instance` if `(reason, instance)` has reached quorum.
    fn certify_if_reached(&mut self, reason: FaultReason, instance: InstanceId) -> bool {
        let threshold = self.quorums.threshold_for(QuorumKind::BackupInstanceFaulty);
        if !self.tracker.reaches(reason, instance, threshold) {
            return false;
        }

        let voters = self.tracker.distinct_voters(reason, instance);
        let (_, purged) = self.remove(instance);
        METRICS.increment_quorum_removals();

        // PRODUCTION ASSERTION: a certified instance carries no vote state
        assert!(
            self.tracker
                .instances()
                .iter()
                .all(|id| *id != instance),
            "vote records remain for removed instance {instance}"
        );

        tracing::info!(
            validator = %self.validator,
            instance = %instance,
            reason = %reason,
            voters,
            threshold,
            purged,
            "quorum reached, backup replica removed"
        );

        true
    }

    /// Tears down `instance` and purges its vote records.
    ///
    /// Only an instance that was running beforehand is remembered for
    /// restoration. Returns whether it was running, and the number of
    /// records purged.
    fn remove(&mut self, instance: InstanceId) -> (bool, usize) {
        let was_active = self.registry.is_active(instance);
        self.registry.remove_replica(instance);
        if was_active {
            self.removed.insert(instance);
        }
        (was_active, self.tracker.purge_instance(instance))
    }

    // ========================================================================
    // Restoration
    // ========================================================================

    /// Re-adds every instance this processor removed and clears all votes.
    ///
    /// With nothing removed this makes no registry calls. Returns the
    /// instances re-added, in ascending order.
    pub fn restore_replicas(&mut self) -> Vec<InstanceId> {
        let cleared = self.tracker.clear();
        let restored: Vec<InstanceId> = std::mem::take(&mut self.removed).into_iter().collect();

        for &instance in &restored {
            self.registry.add_replica(instance);
        }

        if !restored.is_empty() {
            METRICS.record_restoration(restored.len());
            tracing::info!(
                validator = %self.validator,
                restored = ?restored,
                cleared,
                "backup replicas restored"
            );
        } else if cleared > 0 {
            tracing::debug!(
                validator = %self.validator,
                cleared,
                "pending fault votes cleared, nothing to restore"
            );
        }

        restored
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn validator(&self) -> &ValidatorId {
        &self.validator
    }

    pub fn strategies(&self) -> &StrategyConfig {
        &self.strategies
    }

    /// Read-only view of the vote table.
    pub fn tracker(&self) -> &FaultVoteTracker {
        &self.tracker
    }

    /// State of `(reason, instance)` in the vote table.
    pub fn vote_state(&self, reason: FaultReason, instance: InstanceId) -> VoteState {
        self.tracker.state(reason, instance)
    }

    /// Instances removed by this processor and not yet restored.
    pub fn removed_instances(&self) -> &BTreeSet<InstanceId> {
        &self.removed
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn quorums(&self) -> &Q {
        &self.quorums
    }

    /// Replaces the quorum calculator, e.g. after a membership change.
    pub fn set_quorums(&mut self, quorums: Q) {
        self.quorums = quorums;
    }

    pub fn view(&self) -> &V {
        &self.view
    }
}

// ============================================================================
// Shared Handle
// ============================================================================

/// A processor behind one mutex, for hosts that deliver events from more
/// than one thread.
///
/// Each operation holds the lock for its whole validate → record →
/// evaluate → remove sequence.
#[derive(Debug)]
pub struct SharedProcessor<R, G, Q, V> {
    inner: Arc<Mutex<BackupFaultProcessor<R, G, Q, V>>>,
}

impl<R, G, Q, V> Clone for SharedProcessor<R, G, Q, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, G, Q, V> SharedProcessor<R, G, Q, V>
where
    R: ReplicaRegistry,
    G: MessageGateway,
    Q: QuorumCalculator,
    V: ViewSource,
{
    pub fn new(processor: BackupFaultProcessor<R, G, Q, V>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(processor)),
        }
    }

    /// Locks the processor.
    ///
    /// A panic inside an operation leaves the vote table as it was at the
    /// panic point; the lock is still handed out.
    pub fn lock(&self) -> MutexGuard<'_, BackupFaultProcessor<R, G, Q, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on_local_suspicion(
        &self,
        reason: FaultReason,
        instances: &[InstanceId],
    ) -> SuspicionOutcome {
        self.lock().on_local_suspicion(reason, instances)
    }

    pub fn on_backup_degradation(&self, instances: &[InstanceId]) -> SuspicionOutcome {
        self.lock().on_backup_degradation(instances)
    }

    pub fn on_backup_primary_disconnected(&self, instances: &[InstanceId]) -> SuspicionOutcome {
        self.lock().on_backup_primary_disconnected(instances)
    }

    pub fn process_inbound_vote(
        &self,
        msg: &BackupInstanceFaulty,
        sender: &ValidatorId,
    ) -> VoteOutcome {
        self.lock().process_inbound_vote(msg, sender)
    }

    pub fn restore_replicas(&self) -> Vec<InstanceId> {
        self.lock().restore_replicas()
    }
}
