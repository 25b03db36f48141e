use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::cluster::Cluster;
use crate::failure_detector::ack_registry::AckInfo;
use crate::failure_detector::suspicion::{required_confirmations, SuspicionContext};
use crate::member::{MemberDelta, MemberStatus, PeerRecord};
use crate::message::Message;
use crate::periodic::Periodic;

pub mod ack_registry;
pub mod suspicion;

/// Probes one random Alive peer per tick, directly first and through
/// relays after `probe_timeout`, and turns long standing suspicions into
/// failures.
pub(crate) struct FailureDetector {
    cluster: Cluster,
}

impl FailureDetector {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }

    async fn probe(&self, target: PeerRecord) {
        let cluster = &self.cluster;
        let config = &cluster.config;
        let mut waiter = cluster.acks.register(cluster.acks.next_seq());
        let ping = Message::Ping {
            seq: waiter.seq(),
            from: cluster.self_name().to_string(),
            target: target.name.clone(),
            gossip: cluster.piggyback(),
        };
        trace!("{} probe {}", cluster.self_name(), target);
        cluster.send(target.addr, &ping).await;
        if let Some(ack) = waiter.wait(config.probe_timeout).await {
            self.acked(&target, ack).await;
            return;
        }
        let candidates: Vec<PeerRecord> = cluster
            .alive_peers()
            .into_iter()
            .filter(|peer| peer.name != target.name)
            .collect();
        let relays = config.selector.select(&candidates, config.indirect_checks);
        debug!(
            "{} no direct ack from {}, ask {} relays",
            cluster.self_name(),
            target.name,
            relays.len()
        );
        for relay in &relays {
            let indirect = Message::IndirectPing {
                seq: waiter.seq(),
                from: cluster.self_name().to_string(),
                target: target.name.clone(),
                target_addr: target.addr,
                gossip: cluster.piggyback(),
            };
            cluster.send(relay.addr, &indirect).await;
        }
        let remaining = config.probe_interval.saturating_sub(config.probe_timeout);
        if let Some(ack) = waiter.wait(remaining).await {
            self.acked(&target, ack).await;
            return;
        }
        info!(
            "{} no ack from {} within {:?}, suspect it",
            cluster.self_name(),
            target,
            config.probe_interval
        );
        let suspect = MemberDelta::new(
            target.name,
            target.addr,
            MemberStatus::Suspect,
            target.incarnation,
            cluster.self_name(),
        );
        cluster.submit(suspect).await;
    }

    async fn acked(&self, target: &PeerRecord, ack: AckInfo) {
        let alive = MemberDelta::new(
            ack.from,
            target.addr,
            MemberStatus::Alive,
            ack.incarnation,
            self.cluster.self_name(),
        );
        self.cluster.acknowledge(alive).await;
    }

    /// Declares dead every suspect that collected enough confirmations or
    /// outlived its suspicion timeout.
    async fn check_suspects(&self) {
        let cluster = &self.cluster;
        let config = &cluster.config;
        let now = Instant::now();
        let cluster_size = cluster.table.live_count();
        let required = required_confirmations(config.suspicion_mult, cluster_size);
        let snapshot = cluster.table.snapshot();
        let suspects = snapshot
            .iter()
            .filter(|r| r.status == MemberStatus::Suspect && r.name != cluster.self_name());
        for suspect in suspects {
            let context = SuspicionContext {
                suspicion_mult: config.suspicion_mult,
                cluster_size,
                confirmations: suspect.suspect_confirmations.len(),
                probe_interval: config.probe_interval,
            };
            let confirmed =
                required.is_some_and(|required| context.independent_confirmations() >= required);
            let elapsed = now.duration_since(suspect.status_changed_at);
            if confirmed || elapsed >= (config.suspicion_timeout)(&context) {
                info!(
                    "{} declare {} dead, suspected for {:?} with {} confirmations",
                    cluster.self_name(),
                    suspect,
                    elapsed,
                    context.confirmations
                );
                let dead = MemberDelta::new(
                    suspect.name.clone(),
                    suspect.addr,
                    MemberStatus::Dead,
                    suspect.incarnation,
                    cluster.self_name(),
                );
                cluster.submit(dead).await;
            }
        }
    }
}

#[async_trait]
impl Periodic for FailureDetector {
    fn name(&self) -> &'static str {
        "failure-detector"
    }

    async fn tick(&self) {
        if self.cluster.has_left() {
            return;
        }
        self.check_suspects().await;
        let candidates = self.cluster.alive_peers();
        let Some(target) = self.cluster.config.selector.select(&candidates, 1).pop() else {
            return;
        };
        self.probe(target).await;
    }
}

/// Probes `target` on behalf of `requester` and forwards the ack under the
/// requester's sequence number.
pub(crate) async fn relay(
    cluster: Cluster,
    requester: SocketAddr,
    seq: u32,
    target: String,
    target_addr: SocketAddr,
) {
    let mut waiter = cluster.acks.register(cluster.acks.next_seq());
    let ping = Message::Ping {
        seq: waiter.seq(),
        from: cluster.self_name().to_string(),
        target: target.clone(),
        gossip: cluster.piggyback(),
    };
    cluster.send(target_addr, &ping).await;
    match waiter.wait(cluster.config.probe_timeout).await {
        Some(ack) => {
            trace!(
                "{} relay ack of {} to {}",
                cluster.self_name(),
                target,
                requester
            );
            let forward = Message::Ack {
                seq,
                from: ack.from,
                incarnation: ack.incarnation,
                gossip: cluster.piggyback(),
            };
            cluster.send(requester, &forward).await;
        }
        None => {
            debug!(
                "{} relayed probe of {} for {} got no ack",
                cluster.self_name(),
                target,
                requester
            );
        }
    }
}
