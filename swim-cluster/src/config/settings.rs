use std::net::SocketAddr;

use config::Config;
use serde::{Deserialize, Serialize};

use swim_core::util::duration::ConfigDuration;

use crate::cluster_config::ClusterConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub name: String,
    #[serde(rename = "bind-addr")]
    pub bind_addr: String,
    #[serde(rename = "advertise-addr", default)]
    pub advertise_addr: Option<String>,
    #[serde(rename = "probe-interval")]
    pub probe_interval: ConfigDuration,
    #[serde(rename = "probe-timeout")]
    pub probe_timeout: ConfigDuration,
    #[serde(rename = "indirect-checks")]
    pub indirect_checks: usize,
    #[serde(rename = "suspicion-mult")]
    pub suspicion_mult: u32,
    #[serde(rename = "gossip-interval")]
    pub gossip_interval: ConfigDuration,
    /// Zero picks the fan-out from the cluster size.
    #[serde(rename = "gossip-nodes")]
    pub gossip_nodes: usize,
    #[serde(rename = "retransmit-mult")]
    pub retransmit_mult: usize,
    #[serde(rename = "broadcast-capacity")]
    pub broadcast_capacity: usize,
    #[serde(rename = "max-gossip-per-message")]
    pub max_gossip_per_message: usize,
    #[serde(rename = "reap-interval")]
    pub reap_interval: ConfigDuration,
    #[serde(rename = "reap-timeout")]
    pub reap_timeout: ConfigDuration,
    #[serde(rename = "tombstone-timeout")]
    pub tombstone_timeout: ConfigDuration,
    #[serde(rename = "reconnect-interval")]
    pub reconnect_interval: ConfigDuration,
    /// Zero disables periodic push-pull.
    #[serde(rename = "push-pull-interval")]
    pub push_pull_interval: ConfigDuration,
    #[serde(rename = "tcp-timeout")]
    pub tcp_timeout: ConfigDuration,
    #[serde(rename = "event-buffer")]
    pub event_buffer: usize,
}

impl Settings {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let settings: Self = config.get("swim.cluster")?;
        Ok(settings)
    }

    pub fn to_cluster_config(&self) -> Result<ClusterConfig, ConfigError> {
        let bind_addr = parse_addr(&self.bind_addr)?;
        let advertise_addr = self
            .advertise_addr
            .as_deref()
            .filter(|addr| !addr.is_empty())
            .map(parse_addr)
            .transpose()?;
        let push_pull_interval = Some(self.push_pull_interval.to_std_duration())
            .filter(|interval| !interval.is_zero());
        let config = ClusterConfig {
            name: self.name.clone(),
            bind_addr,
            advertise_addr,
            probe_interval: self.probe_interval.into(),
            probe_timeout: self.probe_timeout.into(),
            indirect_checks: self.indirect_checks,
            suspicion_mult: self.suspicion_mult,
            gossip_interval: self.gossip_interval.into(),
            gossip_nodes: Some(self.gossip_nodes).filter(|nodes| *nodes > 0),
            retransmit_mult: self.retransmit_mult,
            broadcast_capacity: self.broadcast_capacity,
            max_gossip_per_message: self.max_gossip_per_message,
            reap_interval: self.reap_interval.into(),
            reap_timeout: self.reap_timeout.into(),
            tombstone_timeout: self.tombstone_timeout.into(),
            reconnect_interval: self.reconnect_interval.into(),
            push_pull_interval,
            tcp_timeout: self.tcp_timeout.into(),
            event_buffer: self.event_buffer,
            ..ClusterConfig::builder()
                .name(self.name.clone())
                .bind_addr(bind_addr)
                .build()
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse()
        .map_err(|_| ConfigError::InvalidBindAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::SettingsBuilder;
    use crate::error::ConfigError;

    #[test]
    fn reference_needs_a_name() -> anyhow::Result<()> {
        let settings = SettingsBuilder::default().build()?;
        assert_eq!(settings.probe_interval.to_std_duration(), Duration::from_secs(1));
        assert!(matches!(
            settings.to_cluster_config(),
            Err(ConfigError::EmptyName)
        ));
        Ok(())
    }

    #[test]
    fn user_file_overrides_reference() -> anyhow::Result<()> {
        let settings = SettingsBuilder::default()
            .add_toml(
                r#"
                [swim.cluster]
                name = "node-127.0.0.1:9000"
                bind-addr = "127.0.0.1:9000"
                probe-interval = { seconds = 5 }
                probe-timeout = { milliseconds = 2500 }
                suspicion-mult = 1
                push-pull-interval = { seconds = 0 }
                gossip-nodes = 3
                "#,
            )
            .build()?;
        let config = settings.to_cluster_config()?;
        assert_eq!(config.name, "node-127.0.0.1:9000");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.probe_interval, Duration::from_secs(5));
        assert_eq!(config.probe_timeout, Duration::from_millis(2500));
        assert_eq!(config.suspicion_mult, 1);
        assert_eq!(config.push_pull_interval, None);
        assert_eq!(config.gossip_nodes, Some(3));
        assert_eq!(config.reap_interval, Duration::from_secs(15));
        assert_eq!(config.tombstone_timeout, Duration::from_secs(24 * 60 * 60));
        Ok(())
    }

    #[test]
    fn duration_override_replaces_reference_unit() -> anyhow::Result<()> {
        let settings = SettingsBuilder::default()
            .add_toml(
                r#"
                [swim.cluster]
                name = "a"
                bind-addr = "127.0.0.1:9000"
                probe-interval = { milliseconds = 200 }
                probe-timeout = "100ms"
                tcp-timeout = { milliseconds = 300 }
                reap-timeout = "90m"
                "#,
            )
            .add_toml(
                r#"
                [swim.cluster]
                gossip-interval = { seconds = 2 }
                "#,
            )
            .add_toml(
                r#"
                [swim.cluster]
                gossip-interval = "50ms"
                "#,
            )
            .build()?;
        let config = settings.to_cluster_config()?;
        assert_eq!(config.probe_interval, Duration::from_millis(200));
        assert_eq!(config.probe_timeout, Duration::from_millis(100));
        assert_eq!(config.tcp_timeout, Duration::from_millis(300));
        assert_eq!(config.reap_timeout, Duration::from_secs(90 * 60));
        assert_eq!(config.gossip_interval, Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn reject_malformed_duration() {
        let result = SettingsBuilder::default()
            .add_toml(
                r#"
                [swim.cluster]
                name = "a"
                probe-interval = "soon"
                "#,
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn reject_unparsable_address() -> anyhow::Result<()> {
        let settings = SettingsBuilder::default()
            .add_toml(
                r#"
                [swim.cluster]
                name = "a"
                bind-addr = "localhost"
                "#,
            )
            .build()?;
        assert!(matches!(
            settings.to_cluster_config(),
            Err(ConfigError::InvalidBindAddress(_))
        ));
        Ok(())
    }
}
