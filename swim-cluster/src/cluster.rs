use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swim_remote::transport::net::NetTransport;
use swim_remote::transport::Transport;

use crate::broadcast_queue::BroadcastQueue;
use crate::cluster_config::ClusterConfig;
use crate::cluster_event::{EventDispatcher, MembershipEvents};
use crate::error::{ConfigError, JoinError};
use crate::failure_detector::ack_registry::AckRegistry;
use crate::failure_detector::FailureDetector;
use crate::gossip::Gossiper;
use crate::member::{MemberDelta, MemberStatus, PeerRecord, Tombstone};
use crate::member_table::MemberTable;
use crate::message::Message;
use crate::periodic::spawn_periodic;
use crate::push_pull::{AntiEntropy, Exchange, PushPullError};
use crate::reaper::Reaper;
use crate::reconnector::Reconnector;
use crate::receiver;

/// A running membership node. Cloning is cheap, every clone drives the same
/// node.
#[derive(Debug, Clone)]
pub struct Cluster {
    inner: Arc<Inner>,
}

#[derive(Debug)]
pub struct Inner {
    pub config: ClusterConfig,
    pub self_addr: SocketAddr,
    pub(crate) table: MemberTable,
    pub(crate) broadcasts: BroadcastQueue,
    pub(crate) acks: Arc<AckRegistry>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events: Mutex<Option<MembershipEvents>>,
    is_terminated: AtomicBool,
}

impl Deref for Cluster {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Returned by [`Cluster::leave`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LeaveAck {
    pub incarnation: u64,
    /// Live peers the leave was sent to directly.
    pub notified: usize,
}

impl Cluster {
    /// Binds a UDP and TCP transport on `config.bind_addr` and starts the node.
    pub async fn start(config: ClusterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = NetTransport::bind(config.bind_addr, config.tcp_timeout)
            .await
            .map_err(|source| ConfigError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let transport: Arc<dyn Transport> = Arc::new(transport);
        match Self::start_with_transport(config, transport.clone()).await {
            Ok(cluster) => Ok(cluster),
            Err(error) => {
                transport.shutdown().await;
                Err(error)
            }
        }
    }

    pub async fn start_with_transport(
        config: ClusterConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let self_addr = config
            .advertise_addr
            .unwrap_or_else(|| transport.local_addr());
        if self_addr.ip().is_unspecified() || self_addr.port() == 0 {
            return Err(ConfigError::InvalidBindAddress(self_addr.to_string()));
        }
        let incoming = transport.incoming().ok_or(ConfigError::TransportInUse)?;
        let (dispatcher, events) = EventDispatcher::new(config.event_buffer);
        let table = MemberTable::new(config.name.clone(), dispatcher);
        let broadcasts =
            BroadcastQueue::new(config.broadcast_capacity, config.retransmit_mult);
        broadcasts.push(table.bootstrap(self_addr).await);
        let inner = Inner {
            config,
            self_addr,
            table,
            broadcasts,
            acks: Arc::new(AckRegistry::default()),
            transport,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            events: Mutex::new(Some(events)),
            is_terminated: AtomicBool::new(false),
        };
        let cluster = Self {
            inner: Arc::new(inner),
        };
        let config = &cluster.config;
        let cancel = cluster.cancel.clone();
        let mut workers = vec![
            spawn_periodic(
                FailureDetector::new(cluster.clone()),
                config.probe_interval,
                cancel.clone(),
            ),
            spawn_periodic(
                Gossiper::new(cluster.clone()),
                config.gossip_interval,
                cancel.clone(),
            ),
            spawn_periodic(
                Reaper::new(cluster.clone()),
                config.reap_interval,
                cancel.clone(),
            ),
            spawn_periodic(
                Reconnector::new(cluster.clone()),
                config.reconnect_interval,
                cancel.clone(),
            ),
            tokio::spawn(receiver::receive_packets(cluster.clone(), incoming.packets)),
            tokio::spawn(receiver::receive_streams(cluster.clone(), incoming.streams)),
        ];
        if let Some(interval) = config.push_pull_interval {
            workers.push(spawn_periodic(
                AntiEntropy::new(cluster.clone()),
                interval,
                cancel.clone(),
            ));
        }
        *cluster.workers.lock() = workers;
        info!("{} started on {}", cluster.self_name(), cluster.self_addr);
        Ok(cluster)
    }

    /// Contacts the seeds in order and merges full state with the first one
    /// that answers. Returns the number of live peers it reported.
    pub async fn join(&self, seeds: &[SocketAddr]) -> Result<usize, JoinError> {
        if self.is_terminated() {
            return Err(JoinError::Shutdown);
        }
        if self.has_left() {
            return Err(JoinError::Left);
        }
        if seeds.is_empty() {
            return Err(JoinError::NoSeeds);
        }
        let mut failures = Vec::new();
        for &seed in seeds {
            if seed == self.self_addr {
                failures.push((seed, "seed is the local node".to_string()));
                continue;
            }
            match self.join_seed(seed).await {
                Ok(discovered) => {
                    info!(
                        "{} joined via {}, {} live peers reported",
                        self.self_name(),
                        seed,
                        discovered
                    );
                    return Ok(discovered);
                }
                Err(PushPullError::Rejected(reason)) => {
                    warn!("{} join rejected by {}: {}", self.self_name(), seed, reason);
                    return Err(JoinError::Rejected { addr: seed, reason });
                }
                Err(error) => {
                    warn!("{} cannot join via {}: {}", self.self_name(), seed, error);
                    failures.push((seed, error.to_string()));
                }
            }
        }
        Err(JoinError::NoSeedReachable(failures))
    }

    async fn join_seed(&self, seed: SocketAddr) -> Result<usize, PushPullError> {
        match crate::push_pull::exchange(self, seed, true).await? {
            Exchange::Merged { discovered } => Ok(discovered),
            Exchange::RejoinAbove(incarnation) => {
                debug!(
                    "{} still tombstoned at #{} on {}, rejoin above it",
                    self.self_name(),
                    incarnation,
                    seed
                );
                if let Some(delta) = self.table.refute_above(incarnation).await {
                    self.broadcasts.push(delta);
                }
                match crate::push_pull::exchange(self, seed, true).await? {
                    Exchange::Merged { discovered } => Ok(discovered),
                    Exchange::RejoinAbove(incarnation) => Err(PushPullError::Tombstoned(incarnation)),
                }
            }
        }
    }

    /// Marks the local node Left and tells every live peer right away, the
    /// regular gossip rounds keep spreading it until shutdown.
    pub async fn leave(&self) -> LeaveAck {
        let Some(delta) = self.table.leave().await else {
            let incarnation = self.local_member().map(|r| r.incarnation).unwrap_or(0);
            return LeaveAck {
                incarnation,
                notified: 0,
            };
        };
        self.broadcasts.push(delta.clone());
        let peers = self.live_peers();
        let message = Message::Gossip {
            from: self.self_name().to_string(),
            gossip: vec![delta.clone()],
        };
        for peer in &peers {
            self.send(peer.addr, &message).await;
        }
        info!(
            "{} left the cluster at #{}, notified {} peers",
            self.self_name(),
            delta.incarnation,
            peers.len()
        );
        LeaveAck {
            incarnation: delta.incarnation,
            notified: peers.len(),
        }
    }

    /// Stops every worker, waiting up to `grace` for in-flight work before
    /// aborting it, then closes the transport.
    pub async fn shutdown(&self, grace: Duration) {
        if self.is_terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();
        if tokio::time::timeout(grace, join_all(workers)).await.is_err() {
            warn!(
                "{} workers still busy after {:?}, abort them",
                self.self_name(),
                grace
            );
            for abort in aborts {
                abort.abort();
            }
        }
        self.transport.shutdown().await;
        info!("{} shut down", self.self_name());
    }
}

impl Inner {
    pub fn self_name(&self) -> &str {
        self.table.self_name()
    }

    /// Every record the node knows, ordered by name.
    pub fn members(&self) -> Vec<PeerRecord> {
        self.table.snapshot().as_ref().clone()
    }

    pub fn alive_members(&self) -> Vec<PeerRecord> {
        self.table
            .snapshot()
            .iter()
            .filter(|r| r.is_alive())
            .cloned()
            .collect()
    }

    pub fn member(&self, name: &str) -> Option<PeerRecord> {
        self.table.get(name)
    }

    pub fn local_member(&self) -> Option<PeerRecord> {
        self.table.local()
    }

    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.table.tombstones().as_ref().clone()
    }

    /// Hands out the event stream, only the first call gets it. Events queue
    /// up to `event_buffer` until it is taken and then block the table.
    pub fn events(&self) -> Option<MembershipEvents> {
        self.events.lock().take()
    }

    /// Offers a delta to the member table like any received gossip.
    pub async fn propose(&self, delta: MemberDelta) -> bool {
        self.submit(delta).await
    }

    pub fn is_terminated(&self) -> bool {
        self.is_terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn has_left(&self) -> bool {
        self.table
            .local()
            .is_some_and(|r| r.status == MemberStatus::Left)
    }

    pub(crate) fn local_incarnation(&self) -> u64 {
        self.table.local().map(|r| r.incarnation).unwrap_or(0)
    }

    /// Alive peers other than the local node.
    pub(crate) fn alive_peers(&self) -> Vec<PeerRecord> {
        self.table
            .snapshot()
            .iter()
            .filter(|r| r.is_alive() && r.name != self.self_name())
            .cloned()
            .collect()
    }

    /// Alive and Suspect peers other than the local node.
    pub(crate) fn live_peers(&self) -> Vec<PeerRecord> {
        self.table
            .snapshot()
            .iter()
            .filter(|r| !r.status.is_down() && r.name != self.self_name())
            .cloned()
            .collect()
    }

    pub(crate) fn piggyback(&self) -> Vec<MemberDelta> {
        self.broadcasts
            .take(self.config.max_gossip_per_message, self.table.live_count())
    }

    /// Arbitrates the delta and queues the winner for dissemination.
    pub(crate) async fn submit(&self, delta: MemberDelta) -> bool {
        match self.table.arbitrate(delta).await {
            Some(applied) => {
                self.broadcasts.push(applied);
                true
            }
            None => false,
        }
    }

    /// Like [`Inner::submit`] for an Alive record learned from an ack.
    pub(crate) async fn acknowledge(&self, delta: MemberDelta) -> bool {
        match self.table.acknowledge(delta).await {
            Some(applied) => {
                self.broadcasts.push(applied);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn merge(&self, deltas: Vec<MemberDelta>) {
        for delta in deltas {
            if !delta.is_well_formed() {
                warn!("{} drop malformed delta {}", self.self_name(), delta);
                continue;
            }
            self.submit(delta).await;
        }
    }

    pub(crate) async fn send(&self, to: SocketAddr, message: &Message) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(error) => {
                warn!("{} encode {} error {:#}", self.self_name(), message.name(), error);
                return;
            }
        };
        if let Err(error) = self.transport.send_packet(to, payload).await {
            warn!("{} send {} to {} error {}", self.self_name(), message.name(), to, error);
        }
    }
}
