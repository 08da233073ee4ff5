use anyhow::{Context, Result};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::AppConfig;
use futures_util::stream::StreamExt;
use messaging::OrdersConsumer;
use order_cache::OrdersCache;
use persistence::PostgresOrderRepository;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failure loading config")?;

    init_telemetry(TelemetryConfig::from(&config.log)).context("could not initialize logging")?;

    info!("Starting Order Persistor...");
    info!("Configuration:");
    info!("  Kafka Brokers: {}", config.kafka_consumer.servers);
    info!("  Kafka Topic: {}", config.kafka_consumer.topic);
    info!("  Consumer Group: {}", config.kafka_consumer.group_id);
    info!("  Cache Size: {}", config.cache.size);
    info!("  Cache Prefill: {}", config.cache.prefill.enabled);
    info!("  API: {}:{}", config.api.host, config.api.port);

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url())
        .await
        .context("creating database pool")?;
    info!("Database connected successfully");

    let store = Arc::new(PostgresOrderRepository::new(pool.clone()));
    let cache = Arc::new(OrdersCache::new(&config.cache, store).context("creating orders cache")?);

    if config.cache.prefill.enabled {
        let timeout = config.cache.prefill.timeout();
        let timeout = (!timeout.is_zero()).then_some(timeout);

        if let Err(e) = cache.prefill(timeout).await {
            error!(error = %e, "Error pre-filling orders cache");
            pool.close().await;
            shutdown_telemetry();
            return Err(e).context("pre-filling orders cache");
        }
    }

    let shutdown = CancellationToken::new();

    let consumer = Arc::new(
        OrdersConsumer::new(config.kafka_consumer.clone(), cache.clone(), shutdown.clone())
            .context("failure creating order consumer")?,
    );

    // Setup signal handling
    let signals = Signals::new([SIGTERM, SIGINT])?;
    let signals_handle = signals.handle();
    let signal_task = tokio::spawn(watch_signals(signals, shutdown.clone()));

    let consumer_task = tokio::spawn({
        let consumer = consumer.clone();
        let shutdown = shutdown.clone();
        async move {
            let result = consumer.run().await;
            info!("Kafka consumer stopped");
            shutdown.cancel();
            result
        }
    });

    let state = AppState::new(cache.clone()).with_consumer(consumer.clone());
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind((config.api.host.as_str(), config.api.port))
        .await
        .context("binding API listener")?;
    info!("Order API listening on {}", listener.local_addr()?);

    let server_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let drain = shutdown.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.cancelled().await })
                .await;
            info!("API server stopped");
            shutdown.cancel();
            result
        }
    });

    shutdown.cancelled().await;
    info!("Shutting down...");

    consumer.stop();

    let consumer_result = match consumer_task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Consumer task failed: {}", e);
            Ok(())
        }
    };

    match tokio::time::timeout(config.api.shutdown_timeout(), server_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Server error: {}", e),
        Ok(Err(e)) => error!("Server task failed: {}", e),
        Err(_) => warn!(
            "API server did not drain within {:?}",
            config.api.shutdown_timeout()
        ),
    }

    signals_handle.close();
    let _ = signal_task.await;

    pool.close().await;
    info!("Order Persistor stopped");

    // Shutdown telemetry gracefully
    shutdown_telemetry();

    match consumer_result {
        Err(e) if !e.is_cancelled() => Err(e).context("kafka consumer failed"),
        _ => Ok(()),
    }
}

async fn watch_signals(mut signals: Signals, shutdown: CancellationToken) {
    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM | SIGINT => {
                info!("Received shutdown signal, stopping...");
                shutdown.cancel();
                break;
            }
            _ => {}
        }
    }
}
