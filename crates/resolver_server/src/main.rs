//! view_resolver: resolves registry references and materializes doc views.
//!
//! Reads config from env vars (see `config.rs`); the required ones are
//!   RESOLVER_GRAPH_URL: graph store query endpoint
//!   RESOLVER_GRAPH_API_KEY: graph store API key
//!   RESOLVER_BUS_INJECT_URL: bus inject endpoint for outbound events

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use resolver_core::{GovernanceGate, SchemaResolver, TracingTelemetry, ViewResolver};
use resolver_core::views::PriceSchedule;
use resolver_graph::HttpGraphClient;
use resolver_server::bus::HttpBus;
use resolver_server::config::ServerConfig;
use resolver_server::observer::BusObserver;
use resolver_server::router::build_router;
use resolver_server::supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,resolver_server=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let policies = config.policies()?;

    let graph = Arc::new(HttpGraphClient::new(config.graph_client())?);
    let bus = Arc::new(HttpBus::new(&config.bus_inject_url, config.publish_timeout)?);
    let gate = Arc::new(GovernanceGate::new(policies, PriceSchedule::default()));

    let schemas = Arc::new(SchemaResolver::new(
        graph.clone(),
        Arc::new(TracingTelemetry),
        config.schema_resolver(),
    ));
    let views = Arc::new(ViewResolver::new(
        graph,
        bus,
        gate,
        config.view_resolver(),
    ));

    let (inbox_tx, inbox_rx) = mpsc::channel(config.queue_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    let observer = BusObserver::new(views, schemas.clone(), inbox_rx, shutdown_rx.clone());
    tasks.spawn(async move {
        observer.run().await;
        Ok(())
    });

    let app = build_router(schemas, inbox_tx);
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!(
        bind = %config.bind_addr,
        graph = %config.graph_name,
        queue_capacity = config.queue_capacity,
        "view_resolver listening"
    );

    let mut server_shutdown = shutdown_rx;
    tasks.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .context("server error")
    });

    supervisor::run_until_stopped(tasks, shutdown_tx, async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")
    })
    .await?;
    tracing::info!("view_resolver stopped");
    Ok(())
}
