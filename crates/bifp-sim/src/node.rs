//! Simulated node: a processor wired to an in-memory replica registry and an
//! outbox gateway.

use std::collections::BTreeSet;

use bifp::{
    BackupFaultProcessor, BackupInstanceFaulty, InstanceId, MessageGateway, Quorums,
    ReplicaRegistry, ViewHandle,
};

/// Replica registry backed by a set of running instances.
#[derive(Debug, Clone, Default)]
pub struct SimRegistry {
    active: BTreeSet<InstanceId>,
    removals: u64,
    additions: u64,
}

impl SimRegistry {
    /// A registry running instances `0..instances`.
    pub fn with_instances(instances: u32) -> Self {
        Self {
            active: (0..instances).map(InstanceId::new).collect(),
            removals: 0,
            additions: 0,
        }
    }

    pub fn removals(&self) -> u64 {
        self.removals
    }

    pub fn additions(&self) -> u64 {
        self.additions
    }
}

impl ReplicaRegistry for SimRegistry {
    fn add_replica(&mut self, instance: InstanceId) {
        self.additions += 1;
        self.active.insert(instance);
    }

    fn remove_replica(&mut self, instance: InstanceId) {
        self.removals += 1;
        self.active.remove(&instance);
    }

    fn active_instances(&self) -> BTreeSet<InstanceId> {
        self.active.clone()
    }

    fn is_active(&self, instance: InstanceId) -> bool {
        self.active.contains(&instance)
    }
}

/// Gateway that parks outbound messages until the cluster drains them onto
/// the network.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    pending: Vec<BackupInstanceFaulty>,
}

impl Outbox {
    pub fn drain(&mut self) -> Vec<BackupInstanceFaulty> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl MessageGateway for Outbox {
    fn send(&mut self, message: BackupInstanceFaulty) {
        self.pending.push(message);
    }
}

/// Processor type every simulated node runs.
pub type SimProcessor = BackupFaultProcessor<SimRegistry, Outbox, Quorums, ViewHandle>;
