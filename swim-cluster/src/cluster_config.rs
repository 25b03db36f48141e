use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use swim_core::ext::duration_ext::DurationExt;

use crate::error::ConfigError;
use crate::failure_detector::suspicion::{default_suspicion_timeout, SuspicionTimeoutFn};
use crate::member::is_valid_name;
use crate::selector::{PeerSelector, RandomSelector};

/// Runtime configuration of one node. Defaults follow the usual LAN
/// settings of SWIM implementations.
#[derive(Clone, TypedBuilder)]
pub struct ClusterConfig {
    #[builder(setter(into))]
    pub name: String,
    pub bind_addr: SocketAddr,
    /// Address other nodes use to reach us, defaults to the bound address.
    #[builder(default, setter(strip_option))]
    pub advertise_addr: Option<SocketAddr>,
    #[builder(default = 1.seconds())]
    pub probe_interval: Duration,
    #[builder(default = 500.millis())]
    pub probe_timeout: Duration,
    #[builder(default = 3)]
    pub indirect_checks: usize,
    #[builder(default = 4)]
    pub suspicion_mult: u32,
    #[builder(default = Arc::new(default_suspicion_timeout) as SuspicionTimeoutFn)]
    pub suspicion_timeout: SuspicionTimeoutFn,
    #[builder(default = 200.millis())]
    pub gossip_interval: Duration,
    /// Fan-out of a gossip round, `ceil(log2(n))` when unset.
    #[builder(default, setter(strip_option))]
    pub gossip_nodes: Option<usize>,
    #[builder(default = 4)]
    pub retransmit_mult: usize,
    #[builder(default = 1024)]
    pub broadcast_capacity: usize,
    #[builder(default = 32)]
    pub max_gossip_per_message: usize,
    #[builder(default = 15.seconds())]
    pub reap_interval: Duration,
    #[builder(default = (24 * 60 * 60).seconds())]
    pub reap_timeout: Duration,
    #[builder(default = (24 * 60 * 60).seconds())]
    pub tombstone_timeout: Duration,
    #[builder(default = 30.seconds())]
    pub reconnect_interval: Duration,
    #[builder(default = Some(30.seconds()))]
    pub push_pull_interval: Option<Duration>,
    #[builder(default = 10.seconds())]
    pub tcp_timeout: Duration,
    #[builder(default = 1024)]
    pub event_buffer: usize,
    #[builder(default = Arc::new(RandomSelector) as Arc<dyn PeerSelector>)]
    pub selector: Arc<dyn PeerSelector>,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !is_valid_name(&self.name) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        if let Some(addr) = &self.advertise_addr {
            if addr.ip().is_unspecified() || addr.port() == 0 {
                return Err(ConfigError::InvalidBindAddress(addr.to_string()));
            }
        }
        let positive = [
            ("probe-interval", self.probe_interval),
            ("probe-timeout", self.probe_timeout),
            ("gossip-interval", self.gossip_interval),
            ("reap-interval", self.reap_interval),
            ("reconnect-interval", self.reconnect_interval),
            ("tcp-timeout", self.tcp_timeout),
        ];
        for (key, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::InvalidSetting(key, "must be positive".to_string()));
            }
        }
        if self.probe_timeout >= self.probe_interval {
            return Err(ConfigError::InvalidSetting(
                "probe-timeout",
                format!(
                    "{:?} must be shorter than probe-interval {:?}",
                    self.probe_timeout, self.probe_interval
                ),
            ));
        }
        if matches!(self.push_pull_interval, Some(interval) if interval.is_zero()) {
            return Err(ConfigError::InvalidSetting(
                "push-pull-interval",
                "must be positive, use none to disable".to_string(),
            ));
        }
        let counts = [
            ("suspicion-mult", self.suspicion_mult as usize),
            ("retransmit-mult", self.retransmit_mult),
            ("broadcast-capacity", self.broadcast_capacity),
            ("max-gossip-per-message", self.max_gossip_per_message),
            ("event-buffer", self.event_buffer),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(ConfigError::InvalidSetting(key, "must be at least 1".to_string()));
            }
        }
        if self.gossip_nodes == Some(0) {
            return Err(ConfigError::InvalidSetting(
                "gossip-nodes",
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Gossip fan-out for a cluster of `cluster_size` live nodes.
    pub fn gossip_fanout(&self, cluster_size: usize) -> usize {
        self.gossip_nodes
            .unwrap_or_else(|| (cluster_size.max(1) as f64).log2().ceil() as usize)
            .max(1)
    }
}

impl Debug for ClusterConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("name", &self.name)
            .field("bind_addr", &self.bind_addr)
            .field("advertise_addr", &self.advertise_addr)
            .field("probe_interval", &self.probe_interval)
            .field("probe_timeout", &self.probe_timeout)
            .field("indirect_checks", &self.indirect_checks)
            .field("suspicion_mult", &self.suspicion_mult)
            .field("gossip_interval", &self.gossip_interval)
            .field("gossip_nodes", &self.gossip_nodes)
            .field("retransmit_mult", &self.retransmit_mult)
            .field("broadcast_capacity", &self.broadcast_capacity)
            .field("max_gossip_per_message", &self.max_gossip_per_message)
            .field("reap_interval", &self.reap_interval)
            .field("reap_timeout", &self.reap_timeout)
            .field("tombstone_timeout", &self.tombstone_timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("push_pull_interval", &self.push_pull_interval)
            .field("tcp_timeout", &self.tcp_timeout)
            .field("event_buffer", &self.event_buffer)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use crate::cluster_config::ClusterConfig;
    use crate::error::ConfigError;

    fn config(name: &str) -> ClusterConfig {
        ClusterConfig::builder()
            .name(name)
            .bind_addr(SocketAddr::from(([127, 0, 0, 1], 7946)))
            .build()
    }

    #[test]
    fn defaults_are_valid() {
        let config = config("node-1");
        assert!(config.validate().is_ok());
        assert_eq!(config.probe_interval, Duration::from_secs(1));
        assert_eq!(config.push_pull_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn reject_bad_names() {
        assert!(matches!(config("").validate(), Err(ConfigError::EmptyName)));
        assert!(matches!(
            config("bad name").validate(),
            Err(ConfigError::InvalidName(_))
        ));
    }

    #[test]
    fn reject_bad_timers() {
        let mut config = config("node-1");
        config.probe_timeout = config.probe_interval;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting("probe-timeout", _))
        ));
        config.probe_timeout = Duration::from_millis(100);
        config.gossip_interval = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting("gossip-interval", _))
        ));
    }

    #[test]
    fn reject_unspecified_advertise_address() {
        let config = ClusterConfig::builder()
            .name("node-1")
            .bind_addr(SocketAddr::from(([0, 0, 0, 0], 7946)))
            .advertise_addr(SocketAddr::from(([0, 0, 0, 0], 7946)))
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBindAddress(_))
        ));
    }

    #[test]
    fn fanout_grows_logarithmically() {
        let mut config = config("node-1");
        assert_eq!(config.gossip_fanout(1), 1);
        assert_eq!(config.gossip_fanout(3), 2);
        assert_eq!(config.gossip_fanout(8), 3);
        assert_eq!(config.gossip_fanout(9), 4);
        config.gossip_nodes = Some(2);
        assert_eq!(config.gossip_fanout(100), 2);
    }
}
