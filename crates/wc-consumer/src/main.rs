//! ConsumerWorker binary (C6).
//!
//! How a host discovers its perspective handlers is out of scope for this
//! crate (WC-SPEC §4.7's routing-table generation is an external concern);
//! this binary starts with an empty [`RoutingTable`] and is meant to be
//! forked into a host-specific binary that registers perspectives before
//! calling `run`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;
use tokio::signal;
use tracing::{error, info, warn};

use wc_consumer::ConsumerConfig;
use wc_coordinator::WorkCoordinator;
use wc_dispatcher::RoutingTable;
use wc_domain::{CoordinatorConfig, InstanceId};
use wc_nats::NatsTransport;
use wc_postgres::PostgresStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConsumerConfig::from_env();
    let coordinator_config = CoordinatorConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(service = %config.service_name, topics = ?config.topics, "starting ConsumerWorker");

    let store = PostgresStore::connect(&config.database_url, coordinator_config.clone()).await?;
    let coordinator = Arc::new(WorkCoordinator::new(Arc::new(store), coordinator_config.clone()));

    let transport = Arc::new(NatsTransport::connect(wc_nats::NatsTransportConfig::from_env()).await?);

    // Empty until a host-specific build registers perspectives.
    let routes = Arc::new(RoutingTable::new());

    let instance_id = InstanceId::new();
    let worker = Arc::new(wc_consumer::ConsumerWorker::new(
        coordinator,
        coordinator_config,
        transport,
        routes,
        instance_id,
        config.service_name.clone(),
        hostname(),
        std::process::id() as i32,
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

    let mut topic_tasks = Vec::new();
    for topic in config.topics.clone() {
        let worker = worker.clone();
        topic_tasks.push(tokio::spawn(async move {
            if let Err(error) = worker.run(&topic).await {
                warn!(%topic, %error, "receive loop exited with error");
            }
        }));
    }

    shutdown_signal().await;
    info!("shutdown signal received, draining ConsumerWorker");
    worker.stop().await;

    for task in topic_tasks {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), task).await;
    }
    health_server.abort();

    info!("ConsumerWorker shutdown complete");
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
