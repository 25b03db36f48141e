use std::fmt::Debug;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::member::PeerRecord;

/// Picks up to `k` distinct peers out of `candidates`. Probing, relaying and
/// gossip all choose their targets through this.
pub trait PeerSelector: Debug + Send + Sync {
    fn select(&self, candidates: &[PeerRecord], k: usize) -> Vec<PeerRecord>;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct RandomSelector;

impl PeerSelector for RandomSelector {
    fn select(&self, candidates: &[PeerRecord], k: usize) -> Vec<PeerRecord> {
        candidates
            .choose_multiple(&mut rand::thread_rng(), k)
            .cloned()
            .collect()
    }
}

/// Reproducible selection for simulations.
#[derive(Debug)]
pub struct SeededSelector {
    rng: Mutex<StdRng>,
}

impl SeededSelector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl PeerSelector for SeededSelector {
    fn select(&self, candidates: &[PeerRecord], k: usize) -> Vec<PeerRecord> {
        let mut rng = self.rng.lock();
        candidates
            .choose_multiple(&mut *rng, k)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};
    use std::net::SocketAddr;

    use tokio::time::Instant;

    use crate::member::{MemberStatus, PeerRecord};
    use crate::selector::{PeerSelector, RandomSelector, SeededSelector};

    fn peers(n: u8) -> Vec<PeerRecord> {
        (0..n)
            .map(|i| PeerRecord {
                name: format!("node-{}", i),
                addr: SocketAddr::from(([10, 0, 0, i], 7946)),
                status: MemberStatus::Alive,
                incarnation: 0,
                status_changed_at: Instant::now(),
                suspect_confirmations: BTreeSet::new(),
            })
            .collect()
    }

    #[test]
    fn picks_distinct_peers() {
        let candidates = peers(10);
        let picked = RandomSelector.select(&candidates, 4);
        assert_eq!(picked.len(), 4);
        let names: HashSet<_> = picked.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names.len(), 4);
        assert_eq!(RandomSelector.select(&candidates, 20).len(), 10);
        assert!(RandomSelector.select(&[], 3).is_empty());
    }

    #[test]
    fn same_seed_same_choice() {
        let candidates = peers(16);
        let first = SeededSelector::new(7);
        let second = SeededSelector::new(7);
        for _ in 0..10 {
            assert_eq!(first.select(&candidates, 3), second.select(&candidates, 3));
        }
    }
}
