/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tunebridge_relay::{build_state, config::load_config, router, CATALOG_PREFIX};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let cfg = load_config()?;
    let addr = cfg.bind;
    info!(upstream = %cfg.upstream_base_url, db = ?cfg.db_path, origins = ?cfg.cors_origins, "starting tunebridge");
    let state = build_state(cfg)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("tunebridge listening on http://{addr} (catalog under {CATALOG_PREFIX})");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("tunebridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("ctrl-c handler failed: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
