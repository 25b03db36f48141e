use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::periodic::Periodic;

pub(crate) struct Reaper {
    cluster: Cluster,
}

impl Reaper {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }

    fn is_due(&self, now: Instant) -> bool {
        let cluster = &self.cluster;
        let reap_timeout = cluster.config.reap_timeout;
        let reapable = cluster.table.snapshot().iter().any(|r| {
            r.status.is_down()
                && r.name != cluster.self_name()
                && now.duration_since(r.status_changed_at) > reap_timeout
        });
        reapable || cluster.table.tombstones().iter().any(|t| t.is_expired(now))
    }
}

#[async_trait]
impl Periodic for Reaper {
    fn name(&self) -> &'static str {
        "reaper"
    }

    async fn tick(&self) {
        if !self.is_due(Instant::now()) {
            return;
        }
        let cluster = &self.cluster;
        let outcome = cluster
            .table
            .reap(cluster.config.reap_timeout, cluster.config.tombstone_timeout)
            .await;
        for name in &outcome.reaped {
            info!(
                "{} reaped {}, tombstone kept for {:?}",
                cluster.self_name(),
                name,
                cluster.config.tombstone_timeout
            );
        }
        for name in &outcome.expired {
            debug!("{} tombstone of {} expired", cluster.self_name(), name);
        }
    }
}
