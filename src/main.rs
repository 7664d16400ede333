use anyhow::{Context, Result};
use hickory_server::ServerFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::signal;
use tracing::info;

use warnlist::config::Config;
use warnlist::engine::{ReloadController, SourceLoader};
use warnlist::init::setup_logging;
use warnlist::policy::PolicyEngine;
use warnlist::server::{Forwarder, PolicyHandler};
use warnlist::stats::StatsCollector;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "warnlist.toml".to_string());
    let config = Config::load(&config_path)
        .await
        .with_context(|| format!("Unable to load {}", config_path))?;

    // 2. Setup Logging
    setup_logging(&config.logging);
    info!("Starting warnlist...");

    // 3. Validate policy settings
    let source_config = config.policy.source_config()?;
    let mode = config.policy.policy_mode()?;
    let upstreams = config.upstream_addrs()?;
    info!("Policy mode: {}", mode);

    // 4. Initial build (must succeed) and reload loop
    let stats = StatsCollector::new();
    let loader = SourceLoader::new(source_config.clone())?;
    let controller =
        ReloadController::start(Arc::new(loader), source_config.reload_period, stats.clone())
            .await?;

    // 5. Build Handler chain
    let engine = PolicyEngine::new(controller.reader(), &source_config);
    let forwarder = Forwarder::new(
        &upstreams,
        Duration::from_millis(config.upstream_timeout_ms),
    );
    let handler = PolicyHandler::new(engine, mode, stats.clone(), forwarder);

    let stats_task = if config.stats.enable && config.stats.log_interval_seconds > 0 {
        Some(stats.spawn_logger(Duration::from_secs(config.stats.log_interval_seconds)))
    } else {
        None
    };

    // 6. Start Server
    let host: IpAddr = config.host.parse().context("Invalid listen host")?;
    let addr = SocketAddr::new(host, config.port);
    let mut server = ServerFuture::new(handler);
    server.register_socket(UdpSocket::bind(addr).await?);
    server.register_listener(TcpListener::bind(addr).await?, Duration::from_secs(5));
    info!("DNS Server listening on {}", addr);

    // 7. Graceful Shutdown
    tokio::select! {
        _ = server.block_until_done() => {},
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    controller.shutdown();
    if let Some(task) = stats_task {
        task.abort();
    }

    Ok(())
}
