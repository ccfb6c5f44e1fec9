//! Event listener binary.
//!
//! Consumes the matching engine's Valkey stream and folds each lifecycle
//! event into Postgres through the idempotent sink.

mod config;
mod sink;

use anyhow::Context;
use event_stream::valkey::ValkeyOptions;
use event_stream::StreamConsumer;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info};

use config::Config;
use sink::PostgresSink;

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
    info!(environment = %cfg.environment, "starting event listener service");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to ping database")?;
    info!("database connection established");

    info!(
        host = %cfg.valkey_host,
        port = cfg.valkey_port,
        stream = %cfg.valkey_stream_name,
        "initializing valkey client"
    );
    let mut consumer = StreamConsumer::connect(&ValkeyOptions {
        host: cfg.valkey_host.clone(),
        port: cfg.valkey_port,
        stream_name: cfg.valkey_stream_name.clone(),
        request_timeout_ms: 0,
    })
    .await
    .context("failed to create valkey client")?;

    let sink = PostgresSink::new(pool.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(async move {
        consumer.run(&sink, shutdown_rx).await;
    });

    shutdown_signal().await;
    info!("received shutdown signal");
    let _ = shutdown_tx.send(true);
    if let Err(err) = consumer_task.await {
        error!(error = %err, "consumer task terminated abnormally");
    }

    pool.close().await;
    info!("shutting down gracefully");
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
