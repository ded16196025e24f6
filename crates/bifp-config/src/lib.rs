//! Configuration management for backup instance fault handling
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (BIFP_* prefix, `__` between sections)
//! 2. bifp.local.toml (gitignored, local overrides)
//! 3. bifp.toml (git-tracked, node config)
//! 4. ~/.config/bifp/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The loaded document is validated once at startup and turned into the
//! immutable [`StrategyConfig`] and [`Quorums`] the processor is built with.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use bifp::{FaultReason, Quorums, RemovalStrategy, StrategyConfig, ValidatorId, quorum};
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BifpConfig {
    pub node: NodeConfig,
    pub cluster: ClusterConfig,
    pub replica_removal: RemovalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This validator's name. Must appear in `cluster.validators`.
    pub name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "Node1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Every validator in the cluster, this node included.
    pub validators: Vec<String>,

    /// Number of consensus instances (master included). When zero, derived
    /// from the cluster size as `f + 1`.
    pub instances: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            validators: (1..=4).map(|i| format!("Node{i}")).collect(),
            instances: 0,
        }
    }
}

/// A strategy as written in a config file.
///
/// `disabled` leaves the reason unconfigured: suspicions for it are ignored
/// and inbound votes for it are dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StrategySetting {
    Local,
    Quorum,
    Disabled,
}

impl StrategySetting {
    pub fn strategy(self) -> Option<RemovalStrategy> {
        match self {
            StrategySetting::Local => Some(RemovalStrategy::Local),
            StrategySetting::Quorum => Some(RemovalStrategy::Quorum),
            StrategySetting::Disabled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Strategy when a backup primary's performance degrades.
    pub degradation: StrategySetting,

    /// Strategy when a backup primary disconnects.
    pub primary_disconnected: StrategySetting,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            degradation: StrategySetting::Local,
            primary_disconnected: StrategySetting::Local,
        }
    }
}

impl BifpConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific node directory
    pub fn load_from_dir(node_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(node_dir).load()
    }

    /// Parse a single TOML document, without layering or validation.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Create a configuration where every reason uses the quorum strategy
    pub fn quorum() -> Self {
        Self {
            replica_removal: RemovalConfig {
                degradation: StrategySetting::Quorum,
                primary_disconnected: StrategySetting::Quorum,
            },
            ..Default::default()
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "node.name must not be empty".to_string(),
            ));
        }

        if self.cluster.validators.is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster.validators must not be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for name in &self.cluster.validators {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "validator {name} listed more than once"
                )));
            }
        }

        if !seen.contains(self.node.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "node {} is not listed in cluster.validators",
                self.node.name
            )));
        }

        Ok(())
    }

    /// Strategy per reason, as handed to the processor.
    pub fn strategy_config(&self) -> StrategyConfig {
        let mut strategies = StrategyConfig::new();
        strategies.set(
            FaultReason::BackupPrimaryDegraded,
            self.replica_removal.degradation.strategy(),
        );
        strategies.set(
            FaultReason::BackupPrimaryDisconnected,
            self.replica_removal.primary_disconnected.strategy(),
        );
        strategies
    }

    /// This node's validator identity.
    pub fn validator_id(&self) -> ValidatorId {
        ValidatorId::new(self.node.name.clone())
    }

    /// Every validator in the cluster.
    pub fn validator_ids(&self) -> Vec<ValidatorId> {
        self.cluster
            .validators
            .iter()
            .cloned()
            .map(ValidatorId::new)
            .collect()
    }

    /// Quorum thresholds for the configured cluster.
    pub fn quorums(&self) -> bifp::Result<Quorums> {
        Quorums::new(self.cluster.validators.len())
    }

    /// Number of consensus instances on each node, master included.
    pub fn instance_count(&self) -> u32 {
        if self.cluster.instances > 0 {
            self.cluster.instances
        } else {
            quorum::max_failures(self.cluster.validators.len()) as u32 + 1
        }
    }
}
