pub const SWIM_CLUSTER_CONFIG: &'static str = include_str!("../cluster.toml");

pub mod broadcast_queue;
pub mod cluster;
pub mod cluster_config;
pub mod cluster_event;
pub mod config;
pub mod error;
pub mod failure_detector;
mod gossip;
pub mod member;
pub mod member_table;
mod message;
mod periodic;
mod push_pull;
mod reaper;
mod receiver;
mod reconnector;
pub mod selector;

pub use swim_remote::transport;
