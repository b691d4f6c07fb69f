//! llmgate gateway binary
//!
//! Entry point for the reverse proxy. Provisions the initial worker,
//! then serves proxied traffic and the `/replace` rotation trigger.

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llmgate_core::{
    ClusterClient, Config, HealthProber, KubeClient, ReadinessProbe, Registry,
};
use llmgate_gateway::api::{build_router, AppState};
use llmgate_gateway::launch::rewrite_port_args;
use llmgate_gateway::replace::{ReplacementController, WorkerSpawner};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting llmgate gateway...");

    let mut config = Config::load(std::env::var("LLMGATE_CONFIG").ok())?;

    // Everything after the binary name is the worker's command line.
    let mut worker_args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(listen_port) = rewrite_port_args(&mut worker_args, config.server.worker_port) {
        config.server.listen_port = listen_port;
    }

    tracing::info!(
        listen_port = config.server.listen_port,
        worker_port = config.server.worker_port,
        namespace = %config.cluster.namespace,
        image = %config.cluster.image,
        "Configuration loaded"
    );

    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClient::from_cluster_env(
        config.cluster.clone(),
        config.server.worker_port,
    )?);
    let prober: Arc<dyn ReadinessProbe> = Arc::new(HealthProber::new(config.server.worker_port)?);

    let spawner = WorkerSpawner::new(
        Arc::clone(&cluster),
        &config.cluster,
        worker_args,
        config.rotation.watchdog_bin.clone(),
    );

    // Worker 0 must be serving before the proxy opens its listener.
    let initial = spawner
        .start_ready(
            0,
            prober.as_ref(),
            config.health.poll_interval(),
            config.health.stall_timeout(),
        )
        .await?;
    let registry = Arc::new(Registry::new(initial, 1));

    let controller = Arc::new(ReplacementController::new(
        Arc::clone(&registry),
        cluster,
        prober,
        spawner,
        config.health.poll_interval(),
        config.health.stall_timeout(),
        config.rotation.drain_poll_interval(),
    ));

    let state = AppState::new(registry, controller, config.server.worker_port)?;
    let router = build_router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.listen_port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Proxy listening on {}", bind_addr);

    // On exit (graceful or not) the per-worker watchdogs notice the parent
    // death and remove the worker Jobs and Services.
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("llmgate gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
