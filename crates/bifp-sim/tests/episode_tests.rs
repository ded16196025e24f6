//! End-to-end fault episodes on simulated clusters.

use bifp::{FaultReason, InstanceId, RemovalStrategy, StrategyConfig};
use bifp_config::BifpConfig;
use bifp_sim::{Episode, NetworkConfig, SimConfig, run_episode};
use test_case::test_case;

fn degraded(faulty: u32) -> Episode {
    Episode::new(FaultReason::BackupPrimaryDegraded, InstanceId::new(faulty))
}

#[test_case(4 ; "four validators")]
#[test_case(7 ; "seven validators")]
#[test_case(10 ; "ten validators")]
#[test_case(13 ; "thirteen validators")]
fn honest_cluster_converges_and_restores(nodes: usize) {
    let report = run_episode(SimConfig::new(nodes, 42), &degraded(1)).unwrap();

    assert!(report.converged);
    assert!(report.fully_restored);
    assert_eq!(report.rejected, 0);
    assert_eq!(report.quorum, (nodes - 1) / 3 + 1);
    for node in &report.per_node {
        assert_eq!(node.removed, vec![1]);
        assert_eq!(node.restored, vec![1]);
    }
}

#[test]
fn disconnection_reason_converges_too() {
    let episode = Episode::new(FaultReason::BackupPrimaryDisconnected, InstanceId::new(2));
    let report = run_episode(SimConfig::new(7, 3), &episode).unwrap();

    assert!(report.converged);
    assert_eq!(report.faulty, 2);
}

#[test]
fn local_strategy_removes_without_votes() {
    let config = SimConfig::new(4, 5)
        .with_instances(3)
        .with_strategies(StrategyConfig::uniform(RemovalStrategy::Local))
        .with_byzantine(1);
    let episode = degraded(1).with_forged_target(InstanceId::new(2));

    let report = run_episode(config, &episode).unwrap();

    assert!(report.converged);
    assert!(!report.forged_target_removed);
    // Three copies of the forged vote reach each of the three honest nodes,
    // all rejected because no node votes on this reason.
    assert_eq!(report.rejected, 9);
    assert_eq!(report.network.sent, 9);
}

#[test]
fn local_suspicion_of_unknown_instance_leaves_cluster_intact() {
    let config = SimConfig::new(4, 6)
        .with_strategies(StrategyConfig::uniform(RemovalStrategy::Local));

    let report = run_episode(config, &degraded(9)).unwrap();

    assert!(!report.converged);
    assert!(report.fully_restored);
    for node in &report.per_node {
        assert!(node.removed.is_empty());
        assert!(node.restored.is_empty());
    }
}

#[test]
fn unconfigured_reason_is_ignored_everywhere() {
    let config = SimConfig::new(4, 8).with_strategies(
        StrategyConfig::new().with(FaultReason::BackupPrimaryDisconnected, RemovalStrategy::Quorum),
    );

    let report = run_episode(config, &degraded(1)).unwrap();

    assert!(!report.converged);
    assert_eq!(report.network.sent, 0);
    assert!(report.per_node.iter().all(|node| node.removed.is_empty()));
}

#[test]
fn lost_network_never_reaches_quorum() {
    let config =
        SimConfig::new(4, 9).with_network(NetworkConfig::reliable().with_drop_probability(1.0));

    let report = run_episode(config, &degraded(1)).unwrap();

    assert!(!report.converged);
    assert_eq!(report.steps, 0);
    assert_eq!(report.network.dropped, 12);
    assert!(report.fully_restored);
}

#[test]
fn duplicated_votes_do_not_change_outcome() {
    let config = SimConfig::new(7, 10)
        .with_network(NetworkConfig::reliable().with_duplicate_probability(1.0));

    let report = run_episode(config, &degraded(1)).unwrap();

    assert!(report.converged);
    assert_eq!(report.network.duplicated, report.network.sent);
    for node in &report.per_node {
        assert_eq!(node.removed, vec![1]);
    }
}

#[test]
fn cluster_shape_from_loaded_config() {
    let mut config = BifpConfig::quorum();
    config.cluster.validators = ["Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta"]
        .map(String::from)
        .to_vec();
    config.node.name = "Alpha".to_string();

    let sim = SimConfig::from_bifp_config(&config, 77);
    assert_eq!(sim.validators.len(), 7);
    assert_eq!(sim.instances, 3);

    let report = run_episode(sim, &degraded(2)).unwrap();
    assert!(report.converged);
    assert_eq!(report.per_node[0].validator, "Alpha");
}
