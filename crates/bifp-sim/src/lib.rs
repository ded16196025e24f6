//! # bifp-sim: Deterministic simulation of backup instance fault voting
//!
//! Runs a whole cluster of [`bifp::BackupFaultProcessor`]s in one process,
//! exchanging encoded `BackupInstanceFaulty` votes over a seeded network
//! that reorders, drops, and duplicates messages.
//!
//! - **Reproducibility**: Same seed → same interleaving → same outcome
//! - **Byzantine voters**: Trailing nodes forge votes against healthy
//!   instances, repeatedly
//! - **Invariant checking**: Master never removed, removed/active sets
//!   partition the instances, no vote state left for removed instances
//!
//! ## Quick Start
//!
//! ```ignore
//! use bifp::{FaultReason, InstanceId};
//! use bifp_sim::{Episode, SimConfig, run_episode};
//!
//! let config = SimConfig::new(7, 12345).with_byzantine(2);
//! let episode = Episode::new(FaultReason::BackupPrimaryDegraded, InstanceId::new(1))
//!     .with_forged_target(InstanceId::new(2));
//! let report = run_episode(config, &episode)?;
//! assert!(report.converged);
//! ```

pub mod cluster;
pub mod error;
pub mod network;
pub mod node;
pub mod scenario;

pub use cluster::{SimCluster, SimConfig};
pub use error::{Result, SimError};
pub use network::{Envelope, NetworkConfig, NetworkStats, SimNetwork};
pub use node::{Outbox, SimProcessor, SimRegistry};
pub use scenario::{Episode, EpisodeReport, NodeReport, run_episode};
