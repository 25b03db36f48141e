use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use itertools::Itertools;
use tracing::{info, warn};

use swim_cluster::cluster::Cluster;
use swim_cluster::config::SettingsBuilder;
use swim_core::ext::init_logger_with_filter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    ip: IpAddr,
    #[arg(short, long, default_value_t = 7946)]
    port: u16,
    /// Seed to join on start.
    #[arg(short, long)]
    target: Option<SocketAddr>,
    /// Settings file layered over the built-in reference settings.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    report_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger_with_filter("swim_cluster=info,node=info");
    let addr = SocketAddr::new(args.ip, args.port);
    let mut builder = SettingsBuilder::default();
    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    let settings = builder
        .add_toml(&format!(
            "[swim.cluster]\nname = \"node-{}\"\nbind-addr = \"{}\"\n",
            addr, addr
        ))
        .build()?;
    let cluster = Cluster::start(settings.to_cluster_config()?).await?;
    if let Some(mut events) = cluster.events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                info!("event {}", event);
            }
        });
    }
    if let Some(target) = args.target {
        match cluster.join(&[target]).await {
            Ok(discovered) => info!("joined {}, {} peers known", target, discovered),
            Err(error) => warn!("join {} failed, keep running alone: {}", target, error),
        }
    }
    let mut report = tokio::time::interval(Duration::from_secs(args.report_secs.max(1)));
    loop {
        tokio::select! {
            _ = report.tick() => {
                let members = cluster.alive_members();
                info!(
                    "{} members: {}",
                    members.len(),
                    members.iter().map(|m| m.name.as_str()).join(", ")
                );
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    warn!("listen ctrl-c error {}", error);
                }
                break;
            }
        }
    }
    let ack = cluster.leave().await;
    info!("left at #{}, told {} peers", ack.incarnation, ack.notified);
    tokio::time::sleep(cluster.config.gossip_interval * 2).await;
    cluster.shutdown(Duration::from_secs(3)).await;
    Ok(())
}
