use std::net::SocketAddr;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use swim_remote::transport::{InboundPacket, StreamRequest};

use crate::cluster::Cluster;
use crate::failure_detector::ack_registry::AckInfo;
use crate::failure_detector::relay;
use crate::message::Message;
use crate::push_pull::serve;

pub(crate) async fn receive_packets(cluster: Cluster, mut packets: mpsc::Receiver<InboundPacket>) {
    loop {
        let packet = tokio::select! {
            _ = cluster.cancel.cancelled() => break,
            packet = packets.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };
        let message = match Message::decode(&packet.payload) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    "{} drop malformed packet from {}: {:#}",
                    cluster.self_name(),
                    packet.from,
                    error
                );
                continue;
            }
        };
        trace!("{} recv {} from {}", cluster.self_name(), message.name(), packet.from);
        handle_packet(&cluster, packet.from, message).await;
    }
    debug!("{} packet receiver stopped", cluster.self_name());
}

async fn handle_packet(cluster: &Cluster, addr: SocketAddr, message: Message) {
    match message {
        Message::Ping {
            seq,
            target,
            gossip,
            ..
        } => {
            // a suspicion riding on the ping is refuted before the ack is built
            cluster.merge(gossip).await;
            if target == cluster.self_name() {
                let ack = Message::Ack {
                    seq,
                    from: cluster.self_name().to_string(),
                    incarnation: cluster.local_incarnation(),
                    gossip: cluster.piggyback(),
                };
                cluster.send(addr, &ack).await;
            } else {
                debug!(
                    "{} ignore ping for {} from {}",
                    cluster.self_name(),
                    target,
                    addr
                );
            }
        }
        Message::IndirectPing {
            seq,
            target,
            target_addr,
            gossip,
            ..
        } => {
            cluster.merge(gossip).await;
            let relaying = cluster.clone();
            tokio::spawn(async move {
                let cancel = relaying.cancel.clone();
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = relay(relaying, addr, seq, target, target_addr) => {}
                }
            });
        }
        Message::Ack {
            seq,
            from,
            incarnation,
            gossip,
        } => {
            if !cluster.acks.resolve(seq, AckInfo { from, incarnation }) {
                trace!("{} late ack {} from {}", cluster.self_name(), seq, addr);
            }
            cluster.merge(gossip).await;
        }
        Message::Gossip { gossip, .. } => {
            cluster.merge(gossip).await;
        }
    }
}

pub(crate) async fn receive_streams(cluster: Cluster, mut streams: mpsc::Receiver<StreamRequest>) {
    loop {
        let request = tokio::select! {
            _ = cluster.cancel.cancelled() => break,
            request = streams.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        trace!("{} recv stream from {}", cluster.self_name(), request.from);
        let serving = cluster.clone();
        tokio::spawn(async move {
            let cancel = serving.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = serve(serving, request) => {}
            }
        });
    }
    debug!("{} stream receiver stopped", cluster.self_name());
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use swim_remote::transport::memory::MemoryNetwork;
    use swim_remote::transport::Transport;

    use crate::cluster::Cluster;
    use crate::cluster_config::ClusterConfig;
    use crate::member::{MemberDelta, MemberStatus};
    use crate::message::{Message, StreamMessage};

    fn addr(host: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, host], 7946))
    }

    async fn start(network: &MemoryNetwork, name: &str, host: u8) -> anyhow::Result<Cluster> {
        let config = ClusterConfig::builder()
            .name(name)
            .bind_addr(addr(host))
            .build();
        let transport = Arc::new(network.bind(addr(host))?);
        Ok(Cluster::start_with_transport(config, transport).await?)
    }

    #[tokio::test(start_paused = true)]
    async fn ping_carrying_suspicion_is_acked_with_refuted_incarnation() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let b = start(&network, "b", 2).await?;
        let prober = network.bind(addr(1))?;
        let mut incoming = prober.incoming().expect("incoming");
        let ping = Message::Ping {
            seq: 7,
            from: "a".to_string(),
            target: "b".to_string(),
            gossip: vec![MemberDelta::new("b", addr(2), MemberStatus::Suspect, 0, "a")],
        };
        prober.send_packet(addr(2), ping.encode()?).await?;
        let packet = incoming.packets.recv().await.expect("ack");
        match Message::decode(&packet.payload)? {
            Message::Ack {
                seq,
                from,
                incarnation,
                ..
            } => {
                assert_eq!(seq, 7);
                assert_eq!(from, "b");
                assert_eq!(incarnation, 1);
            }
            other => panic!("expected an ack, got {:?}", other),
        }
        let local = b.local_member().expect("local record");
        assert_eq!((local.status, local.incarnation), (MemberStatus::Alive, 1));
        b.shutdown(Duration::from_secs(1)).await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_push_pull_parked_on_full_event_queue() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let config = ClusterConfig::builder()
            .name("a")
            .bind_addr(addr(1))
            .event_buffer(1)
            .build();
        let a = Cluster::start_with_transport(config, Arc::new(network.bind(addr(1))?)).await?;
        let client = network.bind(addr(3))?;
        let request = StreamMessage::PushPull {
            from: "c".to_string(),
            join: true,
            states: vec![MemberDelta::new("c", addr(3), MemberStatus::Alive, 0, "c")],
        };
        // the bootstrap event fills the queue, so admitting c waits for room
        let reply = client
            .send_stream(addr(1), request.encode()?, Duration::from_millis(500))
            .await;
        assert!(reply.is_err());
        a.shutdown(Duration::from_secs(1)).await;

        let mut events = a.events().expect("events");
        assert_eq!(events.try_recv().map(|e| e.peer.name), Some("a".to_string()));
        let d = MemberDelta::new("d", addr(4), MemberStatus::Alive, 0, "d");
        let proposed = tokio::time::timeout(Duration::from_millis(100), a.propose(d)).await;
        assert!(matches!(proposed, Ok(true)));
        assert_eq!(events.try_recv().map(|e| e.peer.name), Some("d".to_string()));
        Ok(())
    }
}
