use std::net::SocketAddr;

use itertools::Itertools;
use thiserror::Error;

use swim_remote::transport::TransportError;

use crate::member::MAX_NAME_LEN;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("node name must not be empty")]
    EmptyName,
    #[error("invalid node name {0}, expect at most {} chars of [A-Za-z0-9_.:-]", MAX_NAME_LEN)]
    InvalidName(String),
    #[error("invalid bind address {0}")]
    InvalidBindAddress(String),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },
    #[error("invalid setting {0}: {1}")]
    InvalidSetting(&'static str, String),
    #[error("transport inbound channels are already taken")]
    TransportInUse,
    #[error("load settings error {0:#}")]
    Load(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no seed address given")]
    NoSeeds,
    #[error("join rejected by {addr}: {reason}")]
    Rejected { addr: SocketAddr, reason: String },
    #[error("no seed reachable: {}", format_failures(.0))]
    NoSeedReachable(Vec<(SocketAddr, String)>),
    #[error("local node has left the cluster")]
    Left,
    #[error("cluster is shut down")]
    Shutdown,
}

fn format_failures(failures: &[(SocketAddr, String)]) -> String {
    failures
        .iter()
        .map(|(addr, reason)| format!("{} ({})", addr, reason))
        .join(", ")
}
