//! Capability traits for the processor's external collaborators.
//!
//! The processor is generic over these so hosts plug in their real replica
//! registry and transport, and tests plug in deterministic doubles.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::BackupInstanceFaulty;
use crate::types::{InstanceId, ViewNumber};

/// Owner of the per-instance replicas on this node.
///
/// Both mutators must tolerate being called for an instance already in the
/// target state; the processor does not check first.
pub trait ReplicaRegistry {
    /// Re-creates the replica for `instance`.
    fn add_replica(&mut self, instance: InstanceId);

    /// Tears down the replica for `instance`.
    fn remove_replica(&mut self, instance: InstanceId);

    /// Instances whose replica is currently running.
    fn active_instances(&self) -> BTreeSet<InstanceId>;

    /// Returns true if `instance` currently has a running replica.
    fn is_active(&self, instance: InstanceId) -> bool {
        self.active_instances().contains(&instance)
    }
}

/// Outbound half of the node's messaging layer.
///
/// Delivery, retries and fan-out belong to the implementation. The
/// processor never waits on a send.
pub trait MessageGateway {
    /// Broadcasts `message` to every validator.
    fn send(&mut self, message: BackupInstanceFaulty);
}

/// Read access to the node's current view.
pub trait ViewSource {
    fn current_view(&self) -> ViewNumber;
}

/// Shared view cell written by the view-change machinery and read by the
/// processor.
#[derive(Debug, Clone, Default)]
pub struct ViewHandle {
    view: Arc<AtomicU64>,
}

impl ViewHandle {
    pub fn new(view: ViewNumber) -> Self {
        Self {
            view: Arc::new(AtomicU64::new(view.as_u64())),
        }
    }

    /// Publishes a new current view.
    pub fn set(&self, view: ViewNumber) {
        self.view.store(view.as_u64(), Ordering::Release);
    }

    /// Advances to the next view and returns it. Saturates at `u64::MAX`.
    pub fn advance(&self) -> ViewNumber {
        let previous = self
            .view
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |view| {
                Some(view.saturating_add(1))
            })
            .unwrap_or_else(|view| view);
        ViewNumber::new(previous).next()
    }
}

impl ViewSource for ViewHandle {
    fn current_view(&self) -> ViewNumber {
        ViewNumber::new(self.view.load(Ordering::Acquire))
    }
}

impl ViewSource for ViewNumber {
    fn current_view(&self) -> ViewNumber {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_handle_is_shared_between_clones() {
        let writer = ViewHandle::new(ViewNumber::ZERO);
        let reader = writer.clone();

        writer.set(ViewNumber::new(7));
        assert_eq!(reader.current_view(), ViewNumber::new(7));

        assert_eq!(writer.advance(), ViewNumber::new(8));
        assert_eq!(reader.current_view(), ViewNumber::new(8));
    }

    #[test]
    fn view_handle_advance_saturates() {
        let handle = ViewHandle::new(ViewNumber::new(u64::MAX - 1));

        assert_eq!(handle.advance(), ViewNumber::new(u64::MAX));
        assert_eq!(handle.advance(), ViewNumber::new(u64::MAX));
        assert_eq!(handle.current_view(), ViewNumber::new(u64::MAX));
        assert_eq!(handle.current_view(), handle.current_view().next());
    }
}
