use async_trait::async_trait;
use tracing::trace;

use crate::cluster::Cluster;
use crate::message::Message;
use crate::periodic::Periodic;

/// Pushes the head of the broadcast queue to a few random live peers each
/// round. Suspects are included so they learn about their suspicion.
pub(crate) struct Gossiper {
    cluster: Cluster,
}

impl Gossiper {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Periodic for Gossiper {
    fn name(&self) -> &'static str {
        "gossip"
    }

    async fn tick(&self) {
        let cluster = &self.cluster;
        if cluster.broadcasts.is_empty() {
            return;
        }
        let peers = cluster.live_peers();
        let cluster_size = peers.len() + 1;
        let fanout = cluster.config.gossip_fanout(cluster_size);
        for target in cluster.config.selector.select(&peers, fanout) {
            let gossip = cluster
                .broadcasts
                .take(cluster.config.max_gossip_per_message, cluster_size);
            if gossip.is_empty() {
                break;
            }
            trace!(
                "{} gossip {} deltas to {}, {} still queued",
                cluster.self_name(),
                gossip.len(),
                target.name,
                cluster.broadcasts.len()
            );
            let message = Message::Gossip {
                from: cluster.self_name().to_string(),
                gossip,
            };
            cluster.send(target.addr, &message).await;
        }
    }
}
