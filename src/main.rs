// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! IP Rate Guard Service
//!
//! Counts requests per client IP and blocks any IP that sends more than
//! 100 requests within an hour. Known search-engine crawlers are exempt.
//!
//! ## Usage
//!
//! - **External check**: a reverse proxy calls `/check` before forwarding.
//! - **Direct filter**: clients hit the service; blocked IPs get a 403.
//!
//! Operators inspect and manage state through `/admin/counters` and
//! `/admin/blocked`.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `WINDOW_SECS`: Counting window in seconds (default: 3600)
//! - `THRESHOLD`: Requests per window before blocking (default: 100)
//! - `PAGE_SIZE`: Admin listing page size (default: 20)
//! - `STATE_DIR`: Directory for persisted state (default: memory only)
//! - `FLUSH_INTERVAL_SECS`: Seconds between state flushes (default: 30)
//! - `METRICS_ENABLED`: Serve Prometheus metrics (default: true)
//! - `METRICS_PATH`: Metrics endpoint path (default: /metrics)
//! - `ADMIN_TOKEN`: Bearer token for the `/admin` routes (default: unset,
//!   admin routes refused)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ip_rate_guard::{
    config::{AdminConfig, Config, GuardConfig, MetricsConfig, PersistenceConfig},
    handlers::{self, AppState},
    persistence::{flush_if_changed, FileStore, KeyValueStore},
    RateGuard,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_config();
    config.validate()?;
    info!(
        bind_addr = %config.bind_addr,
        window_secs = config.guard.window_secs,
        threshold = config.guard.threshold,
        state_dir = ?config.persistence.state_dir,
        admin_enabled = config.admin.token.is_some(),
        "Starting IP rate guard"
    );

    let guard = Arc::new(RateGuard::new(config.guard.clone())?);

    // Restore state; a failed load leaves the guard empty
    let store: Option<Arc<dyn KeyValueStore>> = config
        .persistence
        .state_dir
        .as_ref()
        .map(|dir| Arc::new(FileStore::new(dir)) as Arc<dyn KeyValueStore>);
    if let Some(store) = &store {
        if guard.restore(store.as_ref()).is_ok() {
            info!(
                tracked = guard.list_counters(1, 1).total,
                blocked = guard.list_blocked().len(),
                "Restored guard state"
            );
        }
    }

    // Spawn flush task
    let initial_revision = guard.revision();
    let (stop_flush, mut flush_stopped) = oneshot::channel::<()>();
    let flush_task = store.clone().map(|store| {
        let flush_guard = guard.clone();
        let interval = config.persistence.flush_interval();
        tokio::spawn(async move {
            let mut saved = initial_revision;
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut flush_stopped => break,
                }
                match flush_if_changed(flush_guard.clone(), store.clone(), saved).await {
                    Ok(revision) => saved = revision,
                    Err(e) => warn!(error = %e, "Failed to persist guard state"),
                }
            }
            saved
        })
    });
    if config.admin.token.is_none() {
        warn!("ADMIN_TOKEN not set; admin routes are disabled");
    }

    let state = Arc::new(AppState {
        guard: guard.clone(),
        config: config.clone(),
    });
    let app = handlers::router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Final flush, once the periodic writer has finished its last write
    let _ = stop_flush.send(());
    let mut saved = initial_revision;
    if let Some(task) = flush_task {
        match task.await {
            Ok(revision) => saved = revision,
            Err(e) => warn!(error = %e, "Flush task failed"),
        }
    }
    if let Some(store) = store {
        match flush_if_changed(guard, store, saved).await {
            Ok(revision) => info!(revision, "Saved guard state on shutdown"),
            Err(e) => warn!(error = %e, "Failed to save guard state on shutdown"),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load configuration from environment variables.
fn load_config() -> Config {
    let guard_defaults = GuardConfig::default();
    let persistence_defaults = PersistenceConfig::default();
    let metrics_defaults = MetricsConfig::default();

    Config {
        bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        guard: GuardConfig {
            window_secs: env_or("WINDOW_SECS", guard_defaults.window_secs),
            threshold: env_or("THRESHOLD", guard_defaults.threshold),
            page_size: env_or("PAGE_SIZE", guard_defaults.page_size),
            ..guard_defaults
        },
        persistence: PersistenceConfig {
            state_dir: std::env::var("STATE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            flush_interval_secs: env_or(
                "FLUSH_INTERVAL_SECS",
                persistence_defaults.flush_interval_secs,
            ),
        },
        metrics: MetricsConfig {
            enabled: env_or("METRICS_ENABLED", metrics_defaults.enabled),
            path: std::env::var("METRICS_PATH").unwrap_or(metrics_defaults.path),
        },
        admin: AdminConfig {
            token: std::env::var("ADMIN_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        },
    }
}
