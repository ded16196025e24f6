//! # bifp: backup instance fault processing
//!
//! A validator runs one master consensus instance (id `0`) and zero or more
//! backup instances, each serviced by a replica. When a backup instance's
//! primary degrades or disconnects, validators decide, either unilaterally
//! or by quorum vote, to remove that instance's replica, and restore it once
//! the faulty-primary episode is over.
//!
//! This crate contains:
//! - Identifiers ([`InstanceId`], [`ViewNumber`], [`ValidatorId`]) and the
//!   [`FaultReason`] / [`RemovalStrategy`] enumerations
//! - Per-reason strategy configuration ([`StrategyConfig`])
//! - The [`BackupInstanceFaulty`] wire message and its admission checks
//! - Quorum thresholds ([`Quorums`], [`QuorumCalculator`])
//! - The vote table ([`FaultVoteTracker`])
//! - The orchestrator ([`BackupFaultProcessor`])
//!
//! # Safety Properties
//!
//! - Quorum requires `Q` distinct validators; repeats never substitute
//! - At most one removal per instance per fault episode
//! - Votes cast in another view are never counted
//! - The master instance is never removed
//! - Restoration re-adds exactly the instances this node removed

pub mod config;
pub mod error;
pub mod instrumentation;
pub mod message;
pub mod processor;
pub mod quorum;
pub mod tracker;
pub mod traits;
pub mod types;


pub use config::StrategyConfig;
pub use error::{Error, Result};
pub use instrumentation::{METRICS, Metrics, MetricsSnapshot};
pub use message::{BackupInstanceFaulty, Rejection, validate};
pub use processor::{BackupFaultProcessor, SharedProcessor, SuspicionOutcome, VoteOutcome};
pub use quorum::{Quorum, QuorumCalculator, QuorumKind, Quorums};
pub use tracker::{FaultVoteTracker, VoteRecord, VoteState};
pub use traits::{MessageGateway, ReplicaRegistry, ViewHandle, ViewSource};
pub use types::{FaultReason, InstanceId, RemovalStrategy, ValidatorId, ViewNumber};
