use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, trace};

use crate::cluster::Cluster;
use crate::member::{MemberStatus, PeerRecord};
use crate::periodic::Periodic;
use crate::push_pull::exchange;

/// Tries to reach suspected and failed peers that are not reaped yet. A
/// successful exchange brings back their own Alive record.
pub(crate) struct Reconnector {
    cluster: Cluster,
}

impl Reconnector {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }

    async fn reconnect(&self, peer: &PeerRecord) {
        let cluster = &self.cluster;
        match exchange(cluster, peer.addr, false).await {
            Ok(_) => {
                if cluster.member(&peer.name).is_some_and(|r| r.is_alive()) {
                    info!("{} reconnected to {}", cluster.self_name(), peer.name);
                }
            }
            Err(error) => {
                trace!(
                    "{} reconnect to {} failed: {}",
                    cluster.self_name(),
                    peer,
                    error
                );
            }
        }
    }
}

#[async_trait]
impl Periodic for Reconnector {
    fn name(&self) -> &'static str {
        "reconnector"
    }

    async fn tick(&self) {
        if self.cluster.has_left() {
            return;
        }
        let candidates: Vec<PeerRecord> = self
            .cluster
            .table
            .snapshot()
            .iter()
            .filter(|r| matches!(r.status, MemberStatus::Suspect | MemberStatus::Dead))
            .filter(|r| r.name != self.cluster.self_name())
            .cloned()
            .collect();
        join_all(candidates.iter().map(|peer| self.reconnect(peer))).await;
    }
}
