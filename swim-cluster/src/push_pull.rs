use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace, warn};

use swim_remote::transport::{StreamRequest, TransportError};

use crate::cluster::Cluster;
use crate::member::{is_valid_name, MemberDelta, MemberStatus};
use crate::message::StreamMessage;
use crate::periodic::Periodic;

#[derive(Debug, Error)]
pub(crate) enum PushPullError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("still tombstoned at #{0}")]
    Tombstoned(u64),
    #[error("unexpected reply {0}")]
    UnexpectedReply(&'static str),
    #[error("codec error {0:#}")]
    Codec(#[from] anyhow::Error),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Exchange {
    /// Remote state merged; live peers other than us the remote reported.
    Merged { discovered: usize },
    /// The remote holds a tombstone for our name at this incarnation.
    RejoinAbove(u64),
}

/// Sends our full state to `addr` and merges the state it answers with.
pub(crate) async fn exchange(
    cluster: &Cluster,
    addr: SocketAddr,
    join: bool,
) -> Result<Exchange, PushPullError> {
    let request = StreamMessage::PushPull {
        from: cluster.self_name().to_string(),
        join,
        states: cluster.table.states(),
    };
    let reply = cluster
        .transport
        .send_stream(addr, request.encode()?, cluster.config.tcp_timeout)
        .await?;
    match StreamMessage::decode(&reply)? {
        StreamMessage::PushPullReply {
            states,
            rejoin_above,
        } => {
            let discovered = states
                .iter()
                .filter(|d| d.status == MemberStatus::Alive && d.name != cluster.self_name())
                .count();
            trace!(
                "{} pulled {} states from {}",
                cluster.self_name(),
                states.len(),
                addr
            );
            cluster.merge(states).await;
            match rejoin_above {
                Some(incarnation) => Ok(Exchange::RejoinAbove(incarnation)),
                None => Ok(Exchange::Merged { discovered }),
            }
        }
        StreamMessage::JoinRejected { reason } => Err(PushPullError::Rejected(reason)),
        StreamMessage::PushPull { .. } => Err(PushPullError::UnexpectedReply("push-pull")),
    }
}

/// Answers one inbound push-pull request.
pub(crate) async fn serve(cluster: Cluster, request: StreamRequest) {
    let message = match StreamMessage::decode(&request.payload) {
        Ok(message) => message,
        Err(error) => {
            warn!(
                "{} drop malformed stream from {}: {:#}",
                cluster.self_name(),
                request.from,
                error
            );
            return;
        }
    };
    let StreamMessage::PushPull { from, join, states } = message else {
        warn!(
            "{} drop unexpected stream message from {}",
            cluster.self_name(),
            request.from
        );
        return;
    };
    if !is_valid_name(&from) {
        warn!(
            "{} drop push-pull with invalid sender name from {}",
            cluster.self_name(),
            request.from
        );
        return;
    }
    let announced = states.iter().find(|d| d.name == from).cloned();
    let reply = match join.then(|| name_conflict(&cluster, &from, announced.as_ref())).flatten() {
        Some(reason) => {
            warn!("{} reject join of {}: {}", cluster.self_name(), from, reason);
            StreamMessage::JoinRejected { reason }
        }
        None => {
            let rejoin_above = announced.as_ref().and_then(|delta| {
                cluster
                    .table
                    .tombstone(&from)
                    .filter(|tombstone| delta.incarnation <= tombstone.incarnation)
                    .map(|tombstone| tombstone.incarnation)
            });
            cluster.merge(states).await;
            debug!(
                "{} served push-pull of {}{}",
                cluster.self_name(),
                from,
                if join { " (join)" } else { "" }
            );
            StreamMessage::PushPullReply {
                states: cluster.table.states(),
                rejoin_above,
            }
        }
    };
    match reply.encode() {
        Ok(payload) => {
            if !request.respond(payload) {
                trace!("{} push-pull requester gone", cluster.self_name());
            }
        }
        Err(error) => {
            warn!("{} encode push-pull reply error {:#}", cluster.self_name(), error);
        }
    }
}

/// Node names are unique: a live record under the same name at another
/// address means somebody else owns it.
fn name_conflict(cluster: &Cluster, from: &str, announced: Option<&MemberDelta>) -> Option<String> {
    if from == cluster.self_name() {
        return Some(format!("name {} is taken by {}", from, cluster.self_addr));
    }
    let announced = announced?;
    let existing = cluster.member(from)?;
    if !existing.status.is_down() && existing.addr != announced.addr {
        Some(format!("name {} is taken by {}", from, existing.addr))
    } else {
        None
    }
}

/// Periodic full state exchange with one random live peer.
pub(crate) struct AntiEntropy {
    cluster: Cluster,
}

impl AntiEntropy {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Periodic for AntiEntropy {
    fn name(&self) -> &'static str {
        "push-pull"
    }

    async fn tick(&self) {
        let cluster = &self.cluster;
        if cluster.has_left() {
            return;
        }
        let peers = cluster.live_peers();
        let Some(peer) = cluster.config.selector.select(&peers, 1).pop() else {
            return;
        };
        if let Err(error) = exchange(cluster, peer.addr, false).await {
            debug!(
                "{} push-pull with {} failed: {}",
                cluster.self_name(),
                peer,
                error
            );
        }
    }
}
