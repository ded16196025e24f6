//! Quorum thresholds derived from cluster size.
//!
//! For a cluster of `n` validators the tolerated number of byzantine
//! validators is `f = (n - 1) / 3`. A backup-instance fault is certified by
//! `f + 1` distinct validators: at least one of them must be honest.
//!
//! ```text
//!  n   f   backup_instance_faulty (f+1)   strong (n-f)
//!  4   1   2                              3
//!  7   2   3                              5
//! 10   3   4                              7
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kinds of cluster-wide fact this component asks a threshold for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuorumKind {
    /// Votes that a backup instance should be removed.
    BackupInstanceFaulty,
}

/// Supplies vote thresholds from the live cluster membership.
///
/// Implementations are queried on every evaluation, so a host whose cluster
/// size changes may return a different threshold over time.
pub trait QuorumCalculator {
    /// Minimum number of distinct validators required to certify `kind`.
    fn threshold_for(&self, kind: QuorumKind) -> usize;
}

/// A single threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorum {
    value: usize,
}

impl Quorum {
    pub const fn new(value: usize) -> Self {
        Self { value }
    }

    pub const fn value(self) -> usize {
        self.value
    }

    /// Returns true if `count` meets or exceeds the threshold.
    pub const fn is_reached(self, count: usize) -> bool {
        count >= self.value
    }
}

/// Thresholds for a cluster of fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorums {
    n: usize,
    f: usize,

    /// `f + 1`: at least one honest validator.
    pub weak: Quorum,

    /// `n - f`: a BFT majority.
    pub strong: Quorum,

    /// `f + 1`: certification of a backup instance fault.
    pub backup_instance_faulty: Quorum,
}

impl Quorums {
    /// Computes thresholds for a cluster of `n` validators.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidClusterSize(n));
        }

        let f = max_failures(n);

        Ok(Self {
            n,
            f,
            weak: Quorum::new(f + 1),
            strong: Quorum::new(n - f),
            backup_instance_faulty: Quorum::new(f + 1),
        })
    }

    /// Number of validators in the cluster.
    pub fn cluster_size(&self) -> usize {
        self.n
    }

    /// Number of byzantine validators tolerated.
    pub fn max_failures(&self) -> usize {
        self.f
    }
}

impl QuorumCalculator for Quorums {
    fn threshold_for(&self, kind: QuorumKind) -> usize {
        match kind {
            QuorumKind::BackupInstanceFaulty => self.backup_instance_faulty.value(),
        }
    }
}

/// Maximum byzantine validators tolerated by a cluster of `n`.
pub const fn max_failures(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(1, 0, 1, 1 ; "single node")]
    #[test_case(4, 1, 2, 3 ; "four nodes")]
    #[test_case(7, 2, 3, 5 ; "seven nodes")]
    #[test_case(10, 3, 4, 7 ; "ten nodes")]
    #[test_case(13, 4, 5, 9 ; "thirteen nodes")]
    fn thresholds_for_cluster(n: usize, f: usize, faulty: usize, strong: usize) {
        let quorums = Quorums::new(n).unwrap();
        assert_eq!(quorums.max_failures(), f);
        assert_eq!(quorums.threshold_for(QuorumKind::BackupInstanceFaulty), faulty);
        assert_eq!(quorums.strong.value(), strong);
        assert_eq!(quorums.weak.value(), faulty);
    }

    #[test]
    fn empty_cluster_rejected() {
        assert!(matches!(Quorums::new(0), Err(Error::InvalidClusterSize(0))));
    }

    #[test]
    fn is_reached_is_inclusive() {
        let q = Quorum::new(4);
        assert!(!q.is_reached(3));
        assert!(q.is_reached(4));
        assert!(q.is_reached(5));
    }

    proptest! {
        /// Property: f+1 always exceeds the number of byzantine validators,
        /// and never exceeds the cluster.
        #[test]
        fn prop_faulty_quorum_contains_honest_validator(n in 1_usize..200) {
            let quorums = Quorums::new(n).unwrap();
            let q = quorums.threshold_for(QuorumKind::BackupInstanceFaulty);
            prop_assert!(q > quorums.max_failures());
            prop_assert!(q <= n);
            prop_assert!(3 * quorums.max_failures() < n);
        }
    }
}
