//! Roaman reservation server.
//!
//! Wires the Postgres booking store and LISTEN/NOTIFY availability bus into the
//! reservation engine, then serves the HTTP API, the Prometheus scrape endpoint
//! and (optionally) the auto-release sweeper until SIGINT/SIGTERM.

mod config;

use anyhow::Context;
use axum::{Router, routing::get};
use config::Config;
use roaman_core::environment::SystemClock;
use roaman_core::store::BookingStore;
use roaman_postgres::{PgNotifyBus, PostgresBookingStore};
use roaman_runtime::metrics::MetricsServer;
use roaman_runtime::retry::retry_with_backoff;
use roaman_runtime::{AutoReleaseSweeper, AvailabilityNotifier, ReservationEngine};
use roaman_web::{AppState, handlers, router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,roaman=debug,sqlx=warn".into()),
        )
        .with(fmt::layer())
        .init();

    info!("Starting Roaman reservation server");

    let config = Config::from_env();
    info!(
        http_addr = %config.http_addr(),
        metrics_addr = %config.metrics_addr(),
        auto_release = config.auto_release.enabled,
        "Configuration loaded"
    );

    // Database
    info!("Connecting to database...");
    let pool = retry_with_backoff(config.connect_retry(), || {
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
            .connect(&config.database.url)
    })
    .await
    .context("Failed to connect to database")?;

    let store = PostgresBookingStore::from_pool(pool.clone());
    store.migrate().await.context("Failed to run migrations")?;
    info!("Database ready");

    // Engine and availability feed
    let store: Arc<dyn BookingStore> = Arc::new(store);
    let bus = Arc::new(PgNotifyBus::with_capacity(
        pool,
        config.notifier.channel_capacity,
    ));
    let notifier = AvailabilityNotifier::new(bus, store.clone(), config.notifier_config());
    let engine = Arc::new(ReservationEngine::new(
        store.clone(),
        notifier,
        Arc::new(SystemClock),
        config.engine_config(),
    ));

    // Metrics
    let metrics_addr: SocketAddr = config
        .metrics_addr()
        .parse()
        .context("Invalid metrics address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start().context("Failed to install metrics recorder")?;

    let state = AppState::new(engine.clone(), store).with_metrics(metrics.handle().cloned());

    // Shutdown fan-out
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Auto-release
    let sweeper = if config.auto_release.enabled {
        let sweeper = AutoReleaseSweeper::new(engine, config.sweeper_config());
        Some(sweeper.spawn(wait_for(shutdown_rx.clone())))
    } else {
        info!("Auto-release sweeper disabled");
        None
    };

    // Prometheus scrape listener
    let metrics_app = Router::new()
        .route("/metrics", get(handlers::metrics::render))
        .with_state(state.clone());
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .context("Failed to bind metrics listener")?;
    let metrics_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(wait_for(shutdown_rx))
            .await
        {
            error!(error = %e, "Metrics listener failed");
        }
    });
    info!(address = %metrics_addr, "Metrics endpoint listening");

    // API
    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("HTTP server failed")?;

    let background = async {
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                warn!(error = %e, "Auto-release sweeper task ended abnormally");
            }
        }
        if let Err(e) = metrics_task.await {
            warn!(error = %e, "Metrics task ended abnormally");
        }
    };
    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    if tokio::time::timeout(timeout, background).await.is_err() {
        warn!(timeout_secs = timeout.as_secs(), "Background tasks did not stop in time");
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    // An error means the sender is gone, which only happens on shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
