// =============================================================================
// Alpina Signal — Main Entry Point
// =============================================================================
//
// HTTP service that turns recent candles into a LONG/SHORT trade idea, gated
// by a small free quota per user. Subscribed users and the admin are exempt.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod access;
mod api;
mod app_state;
mod binance;
mod error;
mod indicators;
mod market_data;
mod runtime_config;
mod service;
mod signals;
#[cfg(test)]
mod test_support;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::access::InMemoryUserStore;
use crate::app_state::{AppState, CONFIG_PATH};
use crate::binance::BinanceClient;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Alpina Signal starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();

    info!(
        admin = config.admin_user_id.as_deref().unwrap_or("<none>"),
        free_signal_limit = config.free_signal_limit,
        candle_source = %config.candle_source_url,
        "Configuration loaded"
    );

    // ── 2. Candle source & user store ────────────────────────────────────
    let client = BinanceClient::new(config.candle_source_url.clone(), config.fetch_timeout())
        .context("building candle source client")?;
    let store = Arc::new(InMemoryUserStore::new());

    // ── 3. Shared state ──────────────────────────────────────────────────
    let operator_token = std::env::var("ALPINA_ADMIN_TOKEN").ok();
    if operator_token.is_none() {
        warn!("ALPINA_ADMIN_TOKEN not set — operator endpoints are disabled");
    }
    let state = Arc::new(
        AppState::new(config, Arc::new(client), store, Some(PathBuf::from(CONFIG_PATH)))
            .with_operator_token(operator_token),
    );

    // ── 4. API server ────────────────────────────────────────────────────
    let bind_addr = std::env::var("ALPINA_BIND_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
        format!("0.0.0.0:{port}")
    });

    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received — stopping gracefully");
        })
        .await
        .context("API server failed")?;

    // ── 5. Shutdown ──────────────────────────────────────────────────────
    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Alpina Signal shut down complete.");
    Ok(())
}
