//! Identifiers and enumerations shared by every part of the fault protocol.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Instance ID
// ============================================================================

/// Index of a parallel consensus instance on this node.
///
/// Instance `0` is always the master instance and is never eligible for
/// removal. Backup instances are `1..N`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct InstanceId(u32);

impl InstanceId {
    /// The master instance.
    pub const MASTER: InstanceId = InstanceId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true if this is the master instance.
    pub const fn is_master(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this is a backup instance.
    pub const fn is_backup(self) -> bool {
        !self.is_master()
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for InstanceId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<InstanceId> for u32 {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

// ============================================================================
// View Number
// ============================================================================

/// Monotonically increasing epoch identifier, advanced on primary failover.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    pub const ZERO: ViewNumber = ViewNumber(0);

    pub const fn new(view: u64) -> Self {
        Self(view)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next view.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ViewNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ViewNumber> for u64 {
    fn from(view: ViewNumber) -> Self {
        view.0
    }
}

// ============================================================================
// Validator ID
// ============================================================================

/// Authenticated identity of a validator in the cluster.
///
/// Identities are node names. The transport authenticates the sender before
/// a vote reaches the processor, so equality on this type is trusted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorId(String);

impl ValidatorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValidatorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ValidatorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Fault Reason
// ============================================================================

/// Why a backup instance is suspected faulty.
///
/// Reasons are independent namespaces: a vote for one reason never counts
/// toward quorum for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReason {
    /// The backup primary stopped responding.
    BackupPrimaryDisconnected,

    /// The backup primary's ordering throughput fell behind the master.
    BackupPrimaryDegraded,
}

impl FaultReason {
    /// All reasons, in wire-code order.
    pub const ALL: [FaultReason; 2] = [
        FaultReason::BackupPrimaryDisconnected,
        FaultReason::BackupPrimaryDegraded,
    ];

    /// Wire code carried in `BackupInstanceFaulty::reason`.
    pub const fn code(self) -> u16 {
        match self {
            FaultReason::BackupPrimaryDisconnected => 44,
            FaultReason::BackupPrimaryDegraded => 45,
        }
    }

    /// Maps a wire code back to a reason. Unknown codes return `None`.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            44 => Some(FaultReason::BackupPrimaryDisconnected),
            45 => Some(FaultReason::BackupPrimaryDegraded),
            _ => None,
        }
    }
}

impl Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::BackupPrimaryDisconnected => f.write_str("backup_primary_disconnected"),
            FaultReason::BackupPrimaryDegraded => f.write_str("backup_primary_degraded"),
        }
    }
}

impl FromStr for FaultReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup_primary_disconnected" | "primary_disconnected" => {
                Ok(FaultReason::BackupPrimaryDisconnected)
            }
            "backup_primary_degraded" | "degradation" => Ok(FaultReason::BackupPrimaryDegraded),
            other => Err(Error::UnknownReason(other.to_string())),
        }
    }
}

// ============================================================================
// Removal Strategy
// ============================================================================

/// How a node acts on a suspicion for a given reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalStrategy {
    /// Remove the replica immediately on local suspicion. No votes.
    Local,

    /// Broadcast a vote and remove once `Q` distinct validators agree.
    Quorum,
}

impl Display for RemovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalStrategy::Local => f.write_str("local"),
            RemovalStrategy::Quorum => f.write_str("quorum"),
        }
    }
}

impl FromStr for RemovalStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(RemovalStrategy::Local),
            "quorum" => Ok(RemovalStrategy::Quorum),
            other => Err(Error::InvalidStrategy(other.to_string())),
        }
    }
}
