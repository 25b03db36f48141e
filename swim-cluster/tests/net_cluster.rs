use std::net::SocketAddr;
use std::time::Duration;

use swim_cluster::cluster::Cluster;
use swim_cluster::cluster_config::ClusterConfig;
use swim_cluster::error::ConfigError;

use crate::common::{names, wait_until};

mod common;

fn config(name: &str, bind_addr: &str) -> anyhow::Result<ClusterConfig> {
    let config = ClusterConfig::builder()
        .name(name)
        .bind_addr(bind_addr.parse::<SocketAddr>()?)
        .probe_interval(Duration::from_millis(200))
        .probe_timeout(Duration::from_millis(100))
        .gossip_interval(Duration::from_millis(50))
        .tcp_timeout(Duration::from_secs(1))
        .build();
    Ok(config)
}

#[tokio::test]
async fn two_nodes_over_udp_and_tcp() -> anyhow::Result<()> {
    let a = Cluster::start(config("node-a", "127.0.0.1:0")?).await?;
    let b = Cluster::start(config("node-b", "127.0.0.1:0")?).await?;
    assert_ne!(a.self_addr.port(), 0);
    assert_eq!(b.join(&[a.self_addr]).await?, 1);
    let converged = wait_until(Duration::from_secs(2), || {
        names(&a.alive_members()) == ["node-a", "node-b"]
            && names(&b.alive_members()) == ["node-a", "node-b"]
    })
    .await;
    assert!(converged);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(names(&a.alive_members()), ["node-a", "node-b"]);
    b.leave().await;
    b.shutdown(Duration::from_secs(1)).await;
    a.shutdown(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn start_rejects_bad_configuration() -> anyhow::Result<()> {
    assert!(matches!(
        Cluster::start(config("", "127.0.0.1:0")?).await,
        Err(ConfigError::EmptyName)
    ));
    assert!(matches!(
        Cluster::start(config("node-a", "0.0.0.0:0")?).await,
        Err(ConfigError::InvalidBindAddress(_))
    ));
    let a = Cluster::start(config("node-a", "127.0.0.1:0")?).await?;
    let taken = config("node-b", &a.self_addr.to_string())?;
    assert!(matches!(
        Cluster::start(taken).await,
        Err(ConfigError::Bind { .. })
    ));
    a.shutdown(Duration::from_secs(1)).await;
    Ok(())
}
