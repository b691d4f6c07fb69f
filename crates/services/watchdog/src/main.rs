//! llmgate watchdog binary
//!
//! Spawned by the gateway with the bound worker's name as its only
//! argument. Exits 0 never: either the parent dies and cleanup runs, or
//! this process is killed by the gateway when the worker retires.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llmgate_core::{Config, KubeClient};
use llmgate_watchdog::Watchdog;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(worker) = std::env::args().nth(1) else {
        bail!("usage: llmgate-watchdog <worker-name>");
    };

    let config = Config::load(std::env::var("LLMGATE_CONFIG").ok())?;
    let cluster = Arc::new(KubeClient::from_cluster_env(
        config.cluster.clone(),
        config.server.worker_port,
    )?);

    // The gateway is our direct parent; capture it before anything can
    // reparent us.
    let parent = nix::unistd::getppid();

    let watchdog = Watchdog::new(worker, parent, cluster, config.watchdog.poll_interval());
    watchdog.run().await;

    // Cleanup has run; record the abnormal end of the process we watched.
    std::process::exit(1);
}
