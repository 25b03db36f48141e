#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use swim_cluster::cluster::Cluster;
use swim_cluster::cluster_config::ClusterConfig;
use swim_cluster::cluster_event::{EventKind, MembershipEvent};
use swim_cluster::member::{MemberStatus, PeerRecord};
use swim_cluster::selector::SeededSelector;
use swim_cluster::transport::memory::MemoryNetwork;
use swim_core::ext::init_logger_with_filter;

pub const GOSSIP_INTERVAL: Duration = Duration::from_millis(100);
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);

#[ctor::ctor]
fn init() {
    init_logger_with_filter("swim_cluster=debug");
}

pub fn addr(host: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, host], 7946))
}

pub fn config(name: &str, host: u8) -> ClusterConfig {
    ClusterConfig::builder()
        .name(name)
        .bind_addr(addr(host))
        .probe_interval(PROBE_INTERVAL)
        .probe_timeout(Duration::from_millis(200))
        .indirect_checks(2)
        .suspicion_mult(1)
        .gossip_interval(GOSSIP_INTERVAL)
        .reap_interval(Duration::from_millis(500))
        .reap_timeout(Duration::from_secs(2))
        .tombstone_timeout(Duration::from_secs(3))
        .reconnect_interval(Duration::from_secs(1))
        .push_pull_interval(None)
        .tcp_timeout(Duration::from_millis(500))
        .selector(Arc::new(SeededSelector::new(host as u64)))
        .build()
}

pub async fn start(network: &MemoryNetwork, name: &str, host: u8) -> anyhow::Result<Cluster> {
    let transport = network.bind(addr(host))?;
    let cluster = Cluster::start_with_transport(config(name, host), Arc::new(transport)).await?;
    Ok(cluster)
}

pub fn names(members: &[PeerRecord]) -> Vec<String> {
    members.iter().map(|m| m.name.clone()).collect()
}

pub fn status(cluster: &Cluster, name: &str) -> Option<MemberStatus> {
    cluster.member(name).map(|m| m.status)
}

/// Polls `condition` on the (possibly paused) tokio clock.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Collects every membership event of one node in the background.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MembershipEvent>>>,
}

impl EventLog {
    pub fn capture(cluster: &Cluster) -> Self {
        let log = Self::default();
        let mut events = cluster.events().expect("events taken once");
        let sink = log.events.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                sink.lock().push(event);
            }
        });
        log
    }

    /// Kind and status of every event about `name`, in order.
    pub fn of(&self, name: &str) -> Vec<(EventKind, MemberStatus)> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.peer.name == name)
            .map(|e| (e.kind, e.peer.status))
            .collect()
    }

    pub fn count(&self, kind: EventKind, name: &str) -> usize {
        self.of(name).iter().filter(|(k, _)| *k == kind).count()
    }
}
