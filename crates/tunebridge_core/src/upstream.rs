/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client as HttpClient;
use std::time::Duration;

use crate::error::UpstreamError;

/// Timeout applied to every outbound call (connect + response).
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://jiosavan-api2.vercel.app";

/// Query parameters forwarded upstream. `None` values are dropped on the wire.
pub type QueryParams = Vec<(String, Option<String>)>;

/// Successful upstream answer, kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPayload {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// One outbound GET against the catalog upstream.
#[async_trait]
pub trait CatalogUpstream: Send + Sync {
    async fn get(&self, path: &str, params: &QueryParams) -> Result<UpstreamPayload, UpstreamError>;
}

/// reqwest-backed catalog upstream rooted at a fixed base URL.
#[derive(Clone)]
pub struct HttpCatalogUpstream {
    base_url: String,
    http: HttpClient,
}

impl HttpCatalogUpstream {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url).with_context(|| format!("invalid upstream base url {base_url:?}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("upstream base url must be http(s): {base_url}");
        }
        let http = HttpClient::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .connect_timeout(UPSTREAM_TIMEOUT)
            .build()
            .context("build catalog http client")?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: &str, http: HttpClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

pub(crate) fn present_params(params: &QueryParams) -> Vec<(&str, &str)> {
    params
        .iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
        .collect()
}

#[async_trait]
impl CatalogUpstream for HttpCatalogUpstream {
    async fn get(&self, path: &str, params: &QueryParams) -> Result<UpstreamPayload, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(&present_params(params))
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(path, &e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(path, &e))?;
        Ok(UpstreamPayload { content_type, body })
    }
}
