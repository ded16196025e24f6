//! Per-reason removal strategy configuration.
//!
//! The processor never reads strategy settings from an ambient global. A
//! [`StrategyConfig`] is built and validated once at startup and handed to
//! the processor at construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{FaultReason, RemovalStrategy};

/// Mapping from fault reason to the strategy this node applies to it.
///
/// A reason with no entry is "not configured": local suspicions for it are
/// ignored and inbound votes for it are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    strategies: BTreeMap<FaultReason, RemovalStrategy>,
}

impl StrategyConfig {
    /// Creates an empty configuration (no reason configured).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration applying the same strategy to every reason.
    pub fn uniform(strategy: RemovalStrategy) -> Self {
        Self {
            strategies: FaultReason::ALL.iter().map(|r| (*r, strategy)).collect(),
        }
    }

    /// Sets the strategy for a reason.
    pub fn with(mut self, reason: FaultReason, strategy: RemovalStrategy) -> Self {
        self.strategies.insert(reason, strategy);
        self
    }

    /// Builds a configuration from textual `(reason, strategy)` pairs, as
    /// they appear in a config file.
    ///
    /// Fails on the first unknown reason or strategy name.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut config = Self::new();
        for (reason, strategy) in pairs {
            config
                .strategies
                .insert(reason.parse::<FaultReason>()?, strategy.parse::<RemovalStrategy>()?);
        }
        Ok(config)
    }

    /// Sets or clears the strategy for a reason in place.
    pub fn set(&mut self, reason: FaultReason, strategy: Option<RemovalStrategy>) {
        match strategy {
            Some(strategy) => {
                self.strategies.insert(reason, strategy);
            }
            None => {
                self.strategies.remove(&reason);
            }
        }
    }

    /// Returns the strategy for a reason, if configured.
    pub fn strategy_for(&self, reason: FaultReason) -> Option<RemovalStrategy> {
        self.strategies.get(&reason).copied()
    }

    /// Returns true if `reason` is configured for the quorum strategy.
    pub fn is_quorum(&self, reason: FaultReason) -> bool {
        self.strategy_for(reason) == Some(RemovalStrategy::Quorum)
    }

    /// Iterates configured reasons and their strategies.
    pub fn iter(&self) -> impl Iterator<Item = (FaultReason, RemovalStrategy)> + '_ {
        self.strategies.iter().map(|(r, s)| (*r, *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_config_has_no_strategies() {
        let config = StrategyConfig::new();
        for reason in FaultReason::ALL {
            assert_eq!(config.strategy_for(reason), None);
            assert!(!config.is_quorum(reason));
        }
    }

    #[test]
    fn uniform_covers_every_reason() {
        let config = StrategyConfig::uniform(RemovalStrategy::Quorum);
        assert_eq!(config.iter().count(), FaultReason::ALL.len());
        assert!(config.is_quorum(FaultReason::BackupPrimaryDegraded));
        assert!(config.is_quorum(FaultReason::BackupPrimaryDisconnected));
    }

    #[test]
    fn reasons_are_configured_independently() {
        let config = StrategyConfig::new()
            .with(FaultReason::BackupPrimaryDegraded, RemovalStrategy::Local)
            .with(FaultReason::BackupPrimaryDisconnected, RemovalStrategy::Quorum);

        assert!(!config.is_quorum(FaultReason::BackupPrimaryDegraded));
        assert!(config.is_quorum(FaultReason::BackupPrimaryDisconnected));
    }

    #[test]
    fn from_pairs_validates_names() {
        let config =
            StrategyConfig::from_pairs([("degradation", "quorum"), ("primary_disconnected", "local")])
                .unwrap();
        assert_eq!(
            config.strategy_for(FaultReason::BackupPrimaryDegraded),
            Some(RemovalStrategy::Quorum)
        );

        let err = StrategyConfig::from_pairs([("degradation", "vote")]).unwrap_err();
        assert!(matches!(err, Error::InvalidStrategy(_)));

        let err = StrategyConfig::from_pairs([("latency", "quorum")]).unwrap_err();
        assert!(matches!(err, Error::UnknownReason(_)));
    }

    #[test]
    fn set_none_clears_reason() {
        let mut config = StrategyConfig::uniform(RemovalStrategy::Local);
        config.set(FaultReason::BackupPrimaryDegraded, None);
        assert_eq!(config.strategy_for(FaultReason::BackupPrimaryDegraded), None);
        assert_eq!(
            config.strategy_for(FaultReason::BackupPrimaryDisconnected),
            Some(RemovalStrategy::Local)
        );
    }
}
