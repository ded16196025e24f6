//! The `BackupInstanceFaulty` wire message and its admission checks.
//!
//! One message is broadcast per local suspicion event and may name several
//! backup instances at once. Receivers run [`validate`] before touching any
//! vote state; a message that fails any check is dropped whole.
//!
//! # Admission order
//!
//! 1. Instance list is non-empty
//! 2. View number equals the receiver's current view
//! 3. No listed instance is the master instance
//! 4. The reason is known and configured for the quorum strategy here

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;
use crate::error::Result;
use crate::types::{FaultReason, InstanceId, ViewNumber};

// ============================================================================
// Wire Message
// ============================================================================

/// A validator's vote that one or more backup instances are faulty.
///
/// The sender is not part of the message: the transport attaches an
/// authenticated sender identity on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInstanceFaulty {
    /// The sender's view when it voted.
    pub view: ViewNumber,

    /// Backup instances voted faulty together, in the sender's order.
    pub instances: Vec<InstanceId>,

    /// Wire code of the [`FaultReason`].
    ///
    /// Kept as a raw code so messages from validators running a newer
    /// reason set still decode, and are then dropped at admission.
    pub reason: u16,
}

impl BackupInstanceFaulty {
    /// Creates a vote for `instances` under `reason`.
    pub fn new(view: ViewNumber, instances: Vec<InstanceId>, reason: FaultReason) -> Self {
        Self {
            view,
            instances,
            reason: reason.code(),
        }
    }

    /// Returns the decoded reason, or `None` for an unknown code.
    pub fn fault_reason(&self) -> Option<FaultReason> {
        FaultReason::from_code(self.reason)
    }

    /// Returns true if the master instance is named.
    pub fn names_master(&self) -> bool {
        self.instances.iter().any(|id| id.is_master())
    }

    /// Canonical encoding for the transport.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(postcard::to_allocvec(self)?))
    }

    /// Decodes a message produced by [`BackupInstanceFaulty::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

// ============================================================================
// Admission
// ============================================================================

/// Why an inbound vote was dropped.
///
/// These are expected outcomes of asynchrony and byzantine senders. They
/// are logged and counted but never surfaced as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// The message names no instances.
    EmptyInstances,

    /// The message was cast in a different view.
    ViewMismatch {
        expected: ViewNumber,
        received: ViewNumber,
    },

    /// The message names the master instance.
    MasterInstance,

    /// The reason code is not one this node knows.
    UnknownReason(u16),

    /// The reason is not configured for the quorum strategy on this node.
    NotQuorumStrategy(FaultReason),
}

impl Rejection {
    /// Short stable label, used as a metrics key.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::EmptyInstances => "empty_instances",
            Rejection::ViewMismatch { .. } => "view_mismatch",
            Rejection::MasterInstance => "master_instance",
            Rejection::UnknownReason(_) => "unknown_reason",
            Rejection::NotQuorumStrategy(_) => "not_quorum_strategy",
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyInstances => f.write_str("instance list is empty"),
            Rejection::ViewMismatch { expected, received } => {
                write!(f, "view {received} does not match current view {expected}")
            }
            Rejection::MasterInstance => f.write_str("message names the master instance"),
            Rejection::UnknownReason(code) => write!(f, "unknown reason code {code}"),
            Rejection::NotQuorumStrategy(reason) => {
                write!(f, "reason {reason} is not configured for quorum")
            }
        }
    }
}

/// Runs the admission checks on an inbound vote.
///
/// Returns the decoded reason when every check passes.
pub fn validate(
    msg: &BackupInstanceFaulty,
    current_view: ViewNumber,
    strategies: &StrategyConfig,
) -> std::result::Result<FaultReason, Rejection> {
    if msg.instances.is_empty() {
        return Err(Rejection::EmptyInstances);
    }

    if msg.view != current_view {
        return Err(Rejection::ViewMismatch {
            expected: current_view,
            received: msg.view,
        });
    }

    if msg.names_master() {
        return Err(Rejection::MasterInstance);
    }

    let reason = msg
        .fault_reason()
        .ok_or(Rejection::UnknownReason(msg.reason))?;

    if !strategies.is_quorum(reason) {
        return Err(Rejection::NotQuorumStrategy(reason));
    }

    Ok(reason)
}
