//! Matching engine server binary.
//!
//! Wires the engine, the Valkey event publisher, and the HTTP order API
//! together; SIGINT/SIGTERM trigger a graceful shutdown bounded by
//! `SHUTDOWN_TIMEOUT`.

mod config;
mod error;
mod handlers;
mod models;
mod router;
mod service;

use std::sync::Arc;

use anyhow::Context;
use event_stream::valkey::{connect_publisher, ValkeyOptions};
use event_stream::EventStream;
use tokio::net::TcpListener;
use tracing::info;

use config::Config;
use service::OrderService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = Config::from_env();
    info!(
        addr = %cfg.listen_addr,
        environment = %cfg.environment,
        stream = %cfg.valkey_stream_name,
        "starting matching engine server"
    );

    let publisher = connect_publisher(&ValkeyOptions {
        host: cfg.valkey_host.clone(),
        port: cfg.valkey_port,
        stream_name: cfg.valkey_stream_name.clone(),
        request_timeout_ms: cfg.valkey_request_timeout_ms,
    })
    .await
    .context("could not connect to event streaming client")?;
    let stream: Arc<dyn EventStream> = Arc::new(publisher);

    let service = OrderService::start(stream).await;
    let app = router::create_router(service.clone());

    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down server");
    service.close(cfg.shutdown_timeout).await;
    info!("server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
