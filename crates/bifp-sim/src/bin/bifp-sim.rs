//! bifp-sim: run simulated backup instance fault episodes
//!
//! # Usage
//!
//! ```bash
//! # One episode on a 7-node cluster
//! bifp-sim --nodes 7 --seed 12345
//!
//! # Two Byzantine voters forging votes against instance 2
//! bifp-sim --nodes 7 --byzantine 2 --forged-target 2
//!
//! # Lossy network, many seeds, JSON output
//! bifp-sim --drop 0.1 --duplicate 0.2 --iterations 100 --json
//!
//! # Cluster shape and strategies from a node directory's bifp.toml
//! bifp-sim --config ./node1
//! ```

use anyhow::{Context, Result, bail};
use bifp::{FaultReason, InstanceId, RemovalStrategy, StrategyConfig};
use bifp_config::BifpConfig;
use bifp_sim::{Episode, EpisodeReport, NetworkConfig, SimConfig, run_episode};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bifp-sim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of validators
    #[arg(short, long, default_value = "4")]
    nodes: usize,

    /// Instances per node, master included (default: f + 1)
    #[arg(short, long)]
    instances: Option<u32>,

    /// Seed of the first iteration
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    iterations: u64,

    /// Backup instance every honest node suspects
    #[arg(short, long, default_value = "1")]
    faulty: u32,

    /// Fault reason (degradation | primary_disconnected)
    #[arg(short, long, default_value = "degradation")]
    reason: FaultReason,

    /// Strategy applied to every reason (local | quorum)
    #[arg(long, default_value = "quorum")]
    strategy: RemovalStrategy,

    /// Trailing validators that forge votes
    #[arg(short, long, default_value = "0")]
    byzantine: usize,

    /// Healthy instance the Byzantine validators vote against
    #[arg(long)]
    forged_target: Option<u32>,

    /// Probability an envelope is lost
    #[arg(long, default_value = "0.0")]
    drop: f64,

    /// Probability an envelope is delivered twice
    #[arg(long, default_value = "0.0")]
    duplicate: f64,

    /// Node directory to load bifp.toml from; overrides --nodes,
    /// --instances and --strategy
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn sim_config(&self, seed: u64) -> Result<SimConfig> {
        let config = match &self.config {
            Some(dir) => {
                let loaded = BifpConfig::load_from_dir(dir)
                    .with_context(|| format!("Failed to load config from {}", dir.display()))?;
                SimConfig::from_bifp_config(&loaded, seed)
            }
            None => {
                let config = SimConfig::new(self.nodes, seed)
                    .with_strategies(StrategyConfig::uniform(self.strategy));
                match self.instances {
                    Some(instances) => config.with_instances(instances),
                    None => config,
                }
            }
        };

        Ok(config.with_byzantine(self.byzantine).with_network(
            NetworkConfig::reliable()
                .with_drop_probability(self.drop)
                .with_duplicate_probability(self.duplicate),
        ))
    }

    fn episode(&self) -> Result<Episode> {
        if self.faulty == 0 {
            bail!("instance 0 is the master and cannot be faulty");
        }
        let episode = Episode::new(self.reason, InstanceId::new(self.faulty));
        Ok(match self.forged_target {
            Some(target) => episode.with_forged_target(InstanceId::new(target)),
            None => episode,
        })
    }
}

fn print_report(report: &EpisodeReport) {
    println!(
        "seed={} nodes={} quorum={} byzantine={} steps={} rejected={} dropped={} duplicated={}",
        report.seed,
        report.nodes,
        report.quorum,
        report.byzantine,
        report.steps,
        report.rejected,
        report.network.dropped,
        report.network.duplicated,
    );
    println!(
        "  converged={} forged_target_removed={} fully_restored={}",
        report.converged, report.forged_target_removed, report.fully_restored
    );
    for node in &report.per_node {
        let role = if node.byzantine { " (byzantine)" } else { "" };
        println!(
            "  {}{}: removed={:?} restored={:?}",
            node.validator, role, node.removed, node.restored
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let episode = cli.episode()?;

    let mut reports = Vec::new();
    let mut not_converged = 0u64;

    for seed in cli.seed..cli.seed.saturating_add(cli.iterations) {
        let report = run_episode(cli.sim_config(seed)?, &episode)
            .with_context(|| format!("Episode failed for seed {seed}"))?;

        if !report.converged {
            not_converged += 1;
        }
        if cli.json {
            reports.push(report);
        } else {
            print_report(&report);
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if cli.iterations > 1 {
        println!(
            "{} iterations, {} did not converge",
            cli.iterations, not_converged
        );
    }

    Ok(())
}
