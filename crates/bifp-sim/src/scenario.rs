//! End-to-end fault episodes: suspicion, vote exchange, removal, view
//! change, restoration.

use bifp::{FaultReason, InstanceId, ReplicaRegistry};
use serde::{Deserialize, Serialize};

use crate::cluster::{SimCluster, SimConfig};
use crate::error::{Result, SimError};
use crate::network::NetworkStats;

/// One faulty-primary episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub reason: FaultReason,
    /// Backup instance every honest node suspects.
    pub faulty: InstanceId,
    /// Healthy backup the Byzantine nodes vote against, if any.
    pub forged_target: Option<InstanceId>,
    /// Copies of each forged vote a Byzantine node sends.
    pub forged_repeats: usize,
}

impl Episode {
    pub fn new(reason: FaultReason, faulty: InstanceId) -> Self {
        Self {
            reason,
            faulty,
            forged_target: None,
            forged_repeats: 3,
        }
    }

    pub fn with_forged_target(mut self, target: InstanceId) -> Self {
        self.forged_target = Some(target);
        self
    }

    pub fn with_forged_repeats(mut self, repeats: usize) -> Self {
        self.forged_repeats = repeats;
        self
    }
}

/// Per-node outcome of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub validator: String,
    pub byzantine: bool,
    /// Instances removed before the view change.
    pub removed: Vec<u32>,
    /// Instances re-added by restoration.
    pub restored: Vec<u32>,
}

/// Summary of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub seed: u64,
    pub nodes: usize,
    pub instances: u32,
    pub quorum: usize,
    pub byzantine: usize,
    pub reason: FaultReason,
    pub faulty: u32,
    /// Deliveries before the network went idle.
    pub steps: usize,
    pub network: NetworkStats,
    /// Inbound votes dropped by admission checks.
    pub rejected: u64,
    /// The faulty instance was removed on every honest node.
    pub converged: bool,
    /// The forged target was removed on some honest node.
    pub forged_target_removed: bool,
    /// Every honest node runs every instance again after restoration.
    pub fully_restored: bool,
    pub per_node: Vec<NodeReport>,
}

/// Runs `episode` on a fresh cluster built from `config`.
///
/// Fails if a per-node invariant breaks, or if at most `f` Byzantine nodes
/// managed to remove a healthy instance.
pub fn run_episode(config: SimConfig, episode: &Episode) -> Result<EpisodeReport> {
    let mut cluster = SimCluster::new(config)?;
    let quorums = cluster.quorums();

    tracing::info!(
        nodes = cluster.len(),
        quorum = quorums.backup_instance_faulty.value(),
        faulty = %episode.faulty,
        reason = %episode.reason,
        "fault episode started"
    );

    cluster.suspect_on_honest_nodes(episode.reason, &[episode.faulty])?;
    if let Some(target) = episode.forged_target {
        cluster.forge_votes(episode.reason, &[target], episode.forged_repeats)?;
    }

    let steps = cluster.run_until_idle()?;
    cluster.check_invariants()?;

    let converged = cluster.removed_everywhere(episode.faulty);
    let forged_target_removed = episode
        .forged_target
        .is_some_and(|target| cluster.removed_anywhere(target));

    if forged_target_removed && cluster.config().byzantine <= quorums.max_failures() {
        let validator = cluster
            .honest_nodes()
            .find(|&node| {
                episode
                    .forged_target
                    .is_some_and(|target| cluster.removed_on(node).contains(&target))
            })
            .map(|node| cluster.node(node).validator().to_string())
            .unwrap_or_default();
        return Err(SimError::InvariantViolation {
            validator,
            detail: format!(
                "{} byzantine voters removed a healthy instance",
                cluster.config().byzantine
            ),
        });
    }

    let removed: Vec<Vec<u32>> = (0..cluster.len())
        .map(|node| cluster.removed_on(node).into_iter().map(u32::from).collect())
        .collect();

    cluster.advance_view();
    let mut restored = cluster.restore_all().into_iter();
    cluster.check_invariants()?;

    let fully_restored = cluster.honest_nodes().all(|node| {
        cluster.node(node).registry().active_instances().len() == cluster.config().instances as usize
    });

    let per_node = (0..cluster.len())
        .map(|node| {
            let byzantine = cluster.is_byzantine(node);
            let restored = if byzantine {
                Vec::new()
            } else {
                restored
                    .next()
                    .unwrap_or_default()
                    .into_iter()
                    .map(u32::from)
                    .collect()
            };
            NodeReport {
                validator: cluster.node(node).validator().to_string(),
                byzantine,
                removed: if byzantine { Vec::new() } else { removed[node].clone() },
                restored,
            }
        })
        .collect();

    let report = EpisodeReport {
        seed: cluster.config().seed,
        nodes: cluster.len(),
        instances: cluster.config().instances,
        quorum: quorums.backup_instance_faulty.value(),
        byzantine: cluster.config().byzantine,
        reason: episode.reason,
        faulty: episode.faulty.as_u32(),
        steps,
        network: cluster.network_stats(),
        rejected: cluster.rejected(),
        converged,
        forged_target_removed,
        fully_restored,
        per_node,
    };

    tracing::info!(
        converged = report.converged,
        fully_restored = report.fully_restored,
        steps = report.steps,
        rejected = report.rejected,
        "fault episode finished"
    );

    Ok(report)
}
