mod auth;
mod chart;
mod config;
mod db;
mod errors;
mod memory;
mod metrics;
mod mirror;
mod model;
mod pages;
mod rest;
mod retention;
mod validate;

use anyhow::Context;
use axum::{routing::get, Router};
use config::{Config, StoreConfig};
use db::{FirebaseStore, ReadingStore};
use memory::MemoryStore;
use mirror::Mirrors;
use retention::RetentionManager;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    info!("Starting sensor server");
    info!("HTTP server: {}", config.http_addr);
    info!(
        "Retention: ceiling {} bytes, keep newest {}",
        config.retention.max_bytes, config.retention.keep_latest
    );

    metrics::init_metrics();

    let store: Arc<dyn ReadingStore> = match &config.store {
        StoreConfig::Firebase(firebase) => Arc::new(
            FirebaseStore::new(
                &firebase.database_url,
                &firebase.collection,
                firebase.credentials.clone(),
                firebase.timeout,
            )
            .context("Failed to build store client")?,
        ),
        StoreConfig::Memory => {
            warn!("FIREBASE_DATABASE_URL not set, readings are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let mirrors = Mirrors::new(config.mirror_capacity);
    if config.hydrate_mirrors {
        if let Err(e) = mirrors.hydrate(store.as_ref()).await {
            warn!("Could not load stored readings into mirrors: {}", e);
        }
    }

    let retention = Arc::new(RetentionManager::new(store.clone(), config.retention));
    let state = rest::AppState::new(store, mirrors, retention);

    // Build HTTP app with sensor routes and metrics endpoint
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(state));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
