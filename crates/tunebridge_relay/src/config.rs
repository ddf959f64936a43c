/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tunebridge_core::accounts::password::DEFAULT_BCRYPT_COST;
use tunebridge_core::stream_relay::DEFAULT_STREAM_USER_AGENT;
use tunebridge_core::upstream::DEFAULT_UPSTREAM_BASE_URL;

pub const DEFAULT_CORS_ORIGIN: &str = "https://musicstreamingbyayush-sharma.netlify.app";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub upstream_base_url: String,
    pub catalog_routes: Option<PathBuf>,
    pub db_path: PathBuf,
    pub jwt_secret: Option<String>,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
    pub stream_user_agent: String,
    pub max_body_bytes: usize,
}

pub fn load_config() -> Result<RelayConfig> {
    config_from(|key| std::env::var(key).ok())
}

/// Builds the config from an arbitrary key lookup (the process env in production).
pub fn config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<RelayConfig> {
    let var = |key: &str| lookup(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let bind = var("TUNEBRIDGE_BIND").unwrap_or_else(|| "0.0.0.0:5000".to_string());
    let bind: SocketAddr = bind
        .parse()
        .with_context(|| format!("TUNEBRIDGE_BIND invalid: {bind}"))?;
    let upstream_base_url = var("TUNEBRIDGE_UPSTREAM_BASE_URL")
        .or_else(|| var("JIOSAAVN_BASE_URL"))
        .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();
    let catalog_routes = var("TUNEBRIDGE_CATALOG_ROUTES").map(PathBuf::from);
    let db_path = var("TUNEBRIDGE_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tunebridge.db"));
    let jwt_secret = var("TUNEBRIDGE_JWT_SECRET").or_else(|| var("JWT_SECRET"));
    let bcrypt_cost = var("TUNEBRIDGE_BCRYPT_COST")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_BCRYPT_COST)
        .clamp(4, 15);
    let cors_origins = var("TUNEBRIDGE_CORS_ORIGINS")
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]);
    let stream_user_agent =
        var("TUNEBRIDGE_STREAM_USER_AGENT").unwrap_or_else(|| DEFAULT_STREAM_USER_AGENT.to_string());
    let max_body_bytes = var("TUNEBRIDGE_MAX_BODY_BYTES")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1024 * 1024);

    Ok(RelayConfig {
        bind,
        upstream_base_url,
        catalog_routes,
        db_path,
        jwt_secret,
        bcrypt_cost,
        cors_origins,
        stream_user_agent,
        max_body_bytes,
    })
}
