//! PublisherWorker binary (C5).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;
use tokio::signal;
use tracing::{error, info, warn};

use wc_coordinator::{WorkCoordinator, WorkCoordinatorStrategy};
use wc_domain::{CoordinatorConfig, InstanceId, StrategyKind};
use wc_nats::{NatsTransport, NatsTransportConfig};
use wc_postgres::PostgresStore;
use wc_publisher::{PublisherConfig, PublisherWorker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PublisherConfig::from_env();
    let coordinator_config = CoordinatorConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(service = %config.service_name, "starting PublisherWorker");

    let store = PostgresStore::connect(&config.database_url, coordinator_config.clone()).await?;
    let coordinator = Arc::new(WorkCoordinator::new(Arc::new(store), coordinator_config.clone()));
    let transport = Arc::new(NatsTransport::connect(NatsTransportConfig::from_env()).await?);

    let instance_id = InstanceId::new();
    let strategy = Arc::new(WorkCoordinatorStrategy::new(
        coordinator,
        &coordinator_config,
        StrategyKind::Interval,
        instance_id,
        &config.service_name,
        hostname(),
        std::process::id() as i32,
    ));

    let worker = Arc::new(PublisherWorker::new(
        strategy,
        transport,
        coordinator_config.max_stream_parallelism,
        config.idle_backoff(),
        coordinator_config.lease_seconds,
    ));

    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let health_worker = worker.clone();
    let health_app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/ready",
            get(move || {
                let worker = health_worker.clone();
                async move { Json(json!({"state": format!("{:?}", worker.state().await)})) }
            }),
        );

    let health_server = tokio::spawn(async move {
        info!(addr = %health_addr, "health server listening");
        match tokio::net::TcpListener::bind(health_addr).await {
            Ok(listener) => {
                if let Err(error) = axum::serve(listener, health_app).await {
                    error!(%error, "health server error");
                }
            }
            Err(error) => error!(%error, "failed to bind health server"),
        }
    });

    let run_worker = worker.clone();
    let run_task = tokio::spawn(async move {
        run_worker.run().await;
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining PublisherWorker");
    worker.stop().await;

    if tokio::time::timeout(std::time::Duration::from_secs(10), run_task).await.is_err() {
        warn!("publisher worker did not drain within timeout");
    }
    health_server.abort();

    info!("PublisherWorker shutdown complete");
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
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
