//! A cluster of simulated validators exchanging `BackupInstanceFaulty`
//! votes over a [`SimNetwork`].
//!
//! The last `byzantine` nodes never run the protocol honestly: they only
//! inject forged votes. Every other node runs a real
//! [`bifp::BackupFaultProcessor`].

use std::collections::BTreeSet;

use bifp::{
    BackupInstanceFaulty, FaultReason, InstanceId, Quorums, ReplicaRegistry, StrategyConfig,
    SuspicionOutcome, ValidatorId, ViewHandle, ViewNumber, ViewSource,
};
use bifp_config::BifpConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::network::{NetworkConfig, NetworkStats, SimNetwork};
use crate::node::{Outbox, SimProcessor, SimRegistry};

// ============================================================================
// Configuration
// ============================================================================

/// Shape of a simulated cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Seed for every random decision in the run.
    pub seed: u64,
    /// Validator names, one node each.
    pub validators: Vec<ValidatorId>,
    /// Consensus instances per node, master included.
    pub instances: u32,
    /// Strategy every node applies.
    pub strategies: StrategyConfig,
    pub network: NetworkConfig,
    /// How many of the trailing nodes behave Byzantine.
    pub byzantine: usize,
    /// Delivery budget for one quiescence run.
    pub max_steps: usize,
}

impl SimConfig {
    /// `nodes` validators named `Node1..NodeN`, running `f + 1` instances.
    pub fn new(nodes: usize, seed: u64) -> Self {
        Self {
            seed,
            validators: (1..=nodes).map(|i| ValidatorId::new(format!("Node{i}"))).collect(),
            instances: bifp::quorum::max_failures(nodes) as u32 + 1,
            strategies: StrategyConfig::uniform(bifp::RemovalStrategy::Quorum),
            network: NetworkConfig::reliable(),
            byzantine: 0,
            max_steps: 100_000,
        }
    }

    /// Cluster shape and strategies taken from a loaded node configuration.
    pub fn from_bifp_config(config: &BifpConfig, seed: u64) -> Self {
        Self {
            validators: config.validator_ids(),
            instances: config.instance_count(),
            strategies: config.strategy_config(),
            ..Self::new(config.cluster.validators.len(), seed)
        }
    }

    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyConfig) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_byzantine(mut self, byzantine: usize) -> Self {
        self.byzantine = byzantine;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.validators.is_empty() {
            return Err(SimError::InvalidConfig("cluster has no validators".into()));
        }
        if self.instances < 2 {
            return Err(SimError::InvalidConfig(format!(
                "need at least one backup instance, got {} instances",
                self.instances
            )));
        }
        if self.byzantine > self.validators.len() {
            return Err(SimError::InvalidConfig(format!(
                "{} byzantine nodes in a cluster of {}",
                self.byzantine,
                self.validators.len()
            )));
        }
        let unique: BTreeSet<_> = self.validators.iter().collect();
        if unique.len() != self.validators.len() {
            return Err(SimError::InvalidConfig("duplicate validator names".into()));
        }
        for p in [
            self.network.drop_probability,
            self.network.duplicate_probability,
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::InvalidConfig(format!(
                    "probability {p} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Cluster
// ============================================================================

#[derive(Debug)]
pub struct SimCluster {
    config: SimConfig,
    quorums: Quorums,
    nodes: Vec<SimProcessor>,
    views: Vec<ViewHandle>,
    network: SimNetwork,
    rejected: u64,
}

impl SimCluster {
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let quorums = Quorums::new(config.validators.len())?;
        let mut nodes = Vec::with_capacity(config.validators.len());
        let mut views = Vec::with_capacity(config.validators.len());

        for validator in &config.validators {
            let view = ViewHandle::new(ViewNumber::ZERO);
            nodes.push(SimProcessor::new(
                validator.clone(),
                config.strategies.clone(),
                SimRegistry::with_instances(config.instances),
                Outbox::default(),
                quorums,
                view.clone(),
            ));
            views.push(view);
        }

        let network = SimNetwork::new(config.network, ChaCha8Rng::seed_from_u64(config.seed));

        tracing::debug!(
            nodes = nodes.len(),
            instances = config.instances,
            byzantine = config.byzantine,
            quorum = quorums.backup_instance_faulty.value(),
            seed = config.seed,
            "simulated cluster created"
        );

        Ok(Self {
            config,
            quorums,
            nodes,
            views,
            network,
            rejected: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn quorums(&self) -> Quorums {
        self.quorums
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &SimProcessor {
        &self.nodes[index]
    }

    pub fn is_byzantine(&self, index: usize) -> bool {
        index >= self.nodes.len() - self.config.byzantine
    }

    /// Indices of the nodes running the protocol honestly.
    pub fn honest_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| !self.is_byzantine(i))
    }

    /// Indices of the Byzantine nodes.
    pub fn byzantine_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| self.is_byzantine(i))
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.network.stats()
    }

    /// Inbound votes dropped by admission checks so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn in_flight(&self) -> usize {
        self.network.in_flight()
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Raises a local suspicion on one node and puts any resulting vote on
    /// the network.
    pub fn suspect(
        &mut self,
        node: usize,
        reason: FaultReason,
        instances: &[InstanceId],
    ) -> Result<SuspicionOutcome> {
        let outcome = self.nodes[node].on_local_suspicion(reason, instances);
        self.flush_outbox(node)?;
        Ok(outcome)
    }

    /// Raises the same suspicion on every honest node.
    pub fn suspect_on_honest_nodes(
        &mut self,
        reason: FaultReason,
        instances: &[InstanceId],
    ) -> Result<Vec<SuspicionOutcome>> {
        let honest: Vec<usize> = self.honest_nodes().collect();
        honest
            .into_iter()
            .map(|node| self.suspect(node, reason, instances))
            .collect()
    }

    /// Every Byzantine node broadcasts `repeats` copies of a vote against
    /// `instances` in its current view, without any local suspicion.
    pub fn forge_votes(
        &mut self,
        reason: FaultReason,
        instances: &[InstanceId],
        repeats: usize,
    ) -> Result<()> {
        let byzantine: Vec<usize> = self.byzantine_nodes().collect();
        for node in byzantine {
            let message =
                BackupInstanceFaulty::new(self.views[node].current_view(), instances.to_vec(), reason);
            let payload = message.encode()?;
            for _ in 0..repeats {
                self.network.broadcast(node, self.nodes.len(), &payload);
            }
            tracing::debug!(
                node = %self.config.validators[node],
                instances = ?instances,
                repeats,
                "forged votes injected"
            );
        }
        Ok(())
    }

    /// Delivers one in-flight envelope. Returns false when the network is
    /// idle.
    pub fn step(&mut self) -> Result<bool> {
        let Some(envelope) = self.network.next_delivery() else {
            return Ok(false);
        };

        if self.is_byzantine(envelope.to) {
            return Ok(true);
        }

        let message = BackupInstanceFaulty::decode(&envelope.payload)?;
        let sender = self.config.validators[envelope.from].clone();
        let outcome = self.nodes[envelope.to].process_inbound_vote(&message, &sender);
        if outcome.is_rejected() {
            self.rejected += 1;
        }
        self.flush_outbox(envelope.to)?;

        Ok(true)
    }

    /// Delivers until the network is idle. Returns the number of deliveries.
    pub fn run_until_idle(&mut self) -> Result<usize> {
        let mut steps = 0;
        while self.step()? {
            steps += 1;
            if steps >= self.config.max_steps && !self.network.is_idle() {
                return Err(SimError::StepLimit(self.config.max_steps));
            }
        }
        Ok(steps)
    }

    /// Moves every node to the next view. Votes still in flight become
    /// stale.
    pub fn advance_view(&mut self) -> ViewNumber {
        let mut view = ViewNumber::ZERO;
        for handle in &self.views {
            view = handle.advance();
        }
        tracing::debug!(%view, "cluster view advanced");
        view
    }

    /// Runs restoration on every honest node. Returns what each re-added.
    pub fn restore_all(&mut self) -> Vec<Vec<InstanceId>> {
        let honest: Vec<usize> = self.honest_nodes().collect();
        honest
            .into_iter()
            .map(|node| self.nodes[node].restore_replicas())
            .collect()
    }

    fn flush_outbox(&mut self, node: usize) -> Result<()> {
        for message in self.nodes[node].gateway_mut().drain() {
            let payload = message.encode()?;
            self.network.broadcast(node, self.nodes.len(), &payload);
        }
        Ok(())
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Instances currently removed on `node`.
    pub fn removed_on(&self, node: usize) -> Vec<InstanceId> {
        self.nodes[node].removed_instances().iter().copied().collect()
    }

    /// True if `instance` is removed on every honest node.
    pub fn removed_everywhere(&self, instance: InstanceId) -> bool {
        self.honest_nodes()
            .all(|node| self.nodes[node].removed_instances().contains(&instance))
    }

    /// True if `instance` is removed on any honest node.
    pub fn removed_anywhere(&self, instance: InstanceId) -> bool {
        self.honest_nodes()
            .any(|node| self.nodes[node].removed_instances().contains(&instance))
    }

    /// Checks the per-node safety properties on every honest node.
    pub fn check_invariants(&self) -> Result<()> {
        let all: BTreeSet<InstanceId> = (0..self.config.instances).map(InstanceId::new).collect();

        for node in self.honest_nodes() {
            let processor = &self.nodes[node];
            let violation = |detail: String| SimError::InvariantViolation {
                validator: processor.validator().to_string(),
                detail,
            };

            let active = processor.registry().active_instances();
            let removed = processor.removed_instances();

            if !active.contains(&InstanceId::MASTER) {
                return Err(violation("master instance is not running".into()));
            }
            if removed.contains(&InstanceId::MASTER) {
                return Err(violation("master instance recorded as removed".into()));
            }
            if active.intersection(removed).next().is_some() {
                return Err(violation(format!(
                    "instances both active and removed: active={active:?} removed={removed:?}"
                )));
            }
            let covered: BTreeSet<InstanceId> = active.union(removed).copied().collect();
            if covered != all {
                return Err(violation(format!(
                    "instances neither active nor removed: {:?}",
                    all.difference(&covered).collect::<Vec<_>>()
                )));
            }
            let pending = processor.tracker().instances();
            if let Some(stale) = pending.intersection(removed).next() {
                return Err(violation(format!(
                    "vote records remain for removed instance {stale}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bifp::RemovalStrategy;

    fn quorum_cluster(nodes: usize, seed: u64) -> SimCluster {
        SimCluster::new(SimConfig::new(nodes, seed)).unwrap()
    }

    #[test]
    fn config_rejects_cluster_without_backups() {
        let config = SimConfig::new(4, 1).with_instances(1);
        assert!(matches!(
            SimCluster::new(config),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_rejects_more_byzantine_than_nodes() {
        let config = SimConfig::new(4, 1).with_byzantine(5);
        assert!(SimCluster::new(config).is_err());
    }

    #[test]
    fn default_shape_follows_cluster_size() {
        let cluster = quorum_cluster(7, 1);
        assert_eq!(cluster.config().instances, 3);
        assert_eq!(cluster.quorums().backup_instance_faulty.value(), 3);
    }

    #[test]
    fn single_suspicion_does_not_remove() {
        let mut cluster = quorum_cluster(4, 3);
        let faulty = InstanceId::new(1);

        cluster
            .suspect(0, FaultReason::BackupPrimaryDegraded, &[faulty])
            .unwrap();
        cluster.run_until_idle().unwrap();

        assert!(!cluster.removed_anywhere(faulty));
        cluster.check_invariants().unwrap();
    }

    #[test]
    fn local_strategy_sends_nothing() {
        let config = SimConfig::new(4, 3)
            .with_strategies(StrategyConfig::uniform(RemovalStrategy::Local));
        let mut cluster = SimCluster::new(config).unwrap();
        let faulty = InstanceId::new(1);

        let outcome = cluster
            .suspect(2, FaultReason::BackupPrimaryDisconnected, &[faulty])
            .unwrap();

        assert_eq!(outcome, SuspicionOutcome::RemovedLocally(vec![faulty]));
        assert_eq!(cluster.in_flight(), 0);
        assert_eq!(cluster.removed_on(2), vec![faulty]);
        cluster.check_invariants().unwrap();
    }

    #[test]
    fn view_change_makes_in_flight_votes_stale() {
        let mut cluster = quorum_cluster(4, 11);
        let faulty = InstanceId::new(1);

        cluster
            .suspect_on_honest_nodes(FaultReason::BackupPrimaryDegraded, &[faulty])
            .unwrap();
        cluster.advance_view();
        cluster.run_until_idle().unwrap();

        // Each node only ever holds its own vote; peers' votes are stale.
        assert!(!cluster.removed_anywhere(faulty));
        assert_eq!(cluster.rejected(), 12);
    }
}
