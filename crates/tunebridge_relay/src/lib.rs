/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! HTTP surface: catalog proxy and stream relay under `/api/jiosaavn`,
//! accounts under `/api`.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{from_fn, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use tunebridge_core::accounts::{AccountService, PasswordHasher, SqliteUserStore, TokenSigner};
use tunebridge_core::catalog::{CatalogProxy, CatalogTable, OperationSpec};
use tunebridge_core::stream_relay::StreamRelay;
use tunebridge_core::upstream::HttpCatalogUpstream;
use tunebridge_protocol::{AuthorizedResponse, LoginRequest, LoginResponse, MessageBody, RegisterRequest};

pub mod config;
pub mod error;

use config::RelayConfig;
use error::ApiError;

pub const CATALOG_PREFIX: &str = "/api/jiosaavn";
const DEFAULT_CATALOG_CONTENT_TYPE: &str = "application/json; charset=utf-8";

static REQ_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let id = REQ_ID.fetch_add(1, Ordering::Relaxed);
    format!("req-{id}")
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<RelayConfig>,
    pub catalog: CatalogProxy,
    pub relay: StreamRelay,
    pub accounts: AccountService,
}

impl AppState {
    pub fn new(cfg: RelayConfig, catalog: CatalogProxy, relay: StreamRelay, accounts: AccountService) -> Self {
        Self {
            cfg: Arc::new(cfg),
            catalog,
            relay,
            accounts,
        }
    }
}

/// Wires the production collaborators described by `cfg`.
pub fn build_state(cfg: RelayConfig) -> Result<AppState> {
    let mut table = CatalogTable::default();
    if let Some(path) = &cfg.catalog_routes {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read catalog routes {path:?}"))?;
        table = table.with_overrides_json(&raw)?;
        info!(path = ?path, "catalog route overrides loaded");
    }
    let upstream = HttpCatalogUpstream::new(&cfg.upstream_base_url)?;
    let catalog = CatalogProxy::new(Arc::new(upstream), table);
    let relay = StreamRelay::new(&cfg.stream_user_agent)?;

    let store = SqliteUserStore::open(&cfg.db_path)?;
    let signer = match &cfg.jwt_secret {
        Some(secret) => TokenSigner::new(secret),
        None => {
            warn!("no JWT secret configured; using a random one, tokens will not survive a restart");
            TokenSigner::ephemeral()
        }
    };
    let accounts = AccountService::new(Arc::new(store), PasswordHasher::new(cfg.bcrypt_cost), signer);

    Ok(AppState::new(cfg, catalog, relay, accounts))
}

pub fn router(state: AppState) -> Router {
    let max_body = state.cfg.max_body_bytes;
    let cors = cors_layer(&state.cfg.cors_origins);
    let catalog = catalog_routes(state.catalog.table()).route("/stream", get(stream_get));

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/protected", get(protected))
        .nest(CATALOG_PREFIX, catalog)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("req");
                let correlation_id = req
                    .headers()
                    .get("x-correlation-id")
                    .and_then(|v| v.to_str().ok());
                info_span!(
                    "http",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                    correlation_id = ?correlation_id
                )
            }),
        )
        .layer(from_fn(add_security_headers))
        .layer(from_fn(ensure_request_ids))
        .with_state(state)
}

/// One GET route per catalog operation, driven by the table.
fn catalog_routes(table: &CatalogTable) -> Router<AppState> {
    let mut router = Router::new();
    for op in table.operations() {
        let route = op.route;
        let op = Arc::new(op.clone());
        router = if route.contains(":id") {
            router.route(
                route,
                get(
                    move |State(state): State<AppState>,
                          Path(id): Path<String>,
                          Query(query): Query<Vec<(String, String)>>| {
                        let op = op.clone();
                        async move { catalog_call(&state, &op, Some(&id), &query).await }
                    },
                ),
            )
        } else {
            router.route(
                route,
                get(
                    move |State(state): State<AppState>, Query(query): Query<Vec<(String, String)>>| {
                        let op = op.clone();
                        async move { catalog_call(&state, &op, None, &query).await }
                    },
                ),
            )
        };
    }
    router
}

async fn catalog_call(state: &AppState, op: &OperationSpec, id: Option<&str>, query: &[(String, String)]) -> Response {
    match state.catalog.execute(op, id, query).await {
        Ok(payload) => {
            let content_type = payload
                .content_type
                .unwrap_or_else(|| DEFAULT_CATALOG_CONTENT_TYPE.to_string());
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], payload.body).into_response()
        }
        Err(error) => ApiError::Catalog {
            failure_message: op.failure_message,
            error,
        }
        .into_response(),
    }
}

async fn stream_get(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let url = query.iter().find(|(k, _)| k == "url").map(|(_, v)| v.as_str());
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let stream = state.relay.open(url, range).await?;
    let head = stream.head;

    let mut resp = Response::new(Body::from_stream(stream.body));
    *resp.status_mut() = StatusCode::from_u16(head.status).unwrap_or(StatusCode::OK);
    let out = resp.headers_mut();
    out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&head.content_type).unwrap_or_else(|_| HeaderValue::from_static("audio/mpeg")),
    );
    if let Some(len) = head.content_length {
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    for (name, value) in [
        (header::ACCEPT_RANGES, head.accept_ranges),
        (header::CONTENT_RANGE, head.content_range),
    ] {
        if let Some(v) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            out.insert(name, v);
        }
    }
    Ok(resp)
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Result<Json<MessageBody>, ApiError> {
    state.accounts.register(req).await?;
    Ok(Json(MessageBody::new("User registered successfully!")))
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.accounts.login(req).await?))
}

async fn protected(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<AuthorizedResponse>, ApiError> {
    let authorization = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let claims = state.accounts.authorize(authorization)?;
    Ok(Json(AuthorizedResponse {
        message: "You are authorized!".to_string(),
        user: claims,
    }))
}

async fn root() -> impl IntoResponse {
    (StatusCode::OK, "Backend is running fine!")
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn add_security_headers(req: axum::http::Request<Body>, next: Next) -> Response {
    let req_headers = req.headers();
    let request_id = req_headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(next_request_id);
    let correlation = req_headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(
        "X-Request-Id",
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("req")),
    );
    if let Some(correlation) = correlation {
        headers.insert(
            "X-Correlation-Id",
            HeaderValue::from_str(&correlation).unwrap_or_else(|_| HeaderValue::from_static("corr")),
        );
    }
    headers.entry("X-Content-Type-Options").or_insert(HeaderValue::from_static("nosniff"));
    headers.entry("Referrer-Policy").or_insert(HeaderValue::from_static("no-referrer"));
    resp
}

async fn ensure_request_ids(mut req: axum::http::Request<Body>, next: Next) -> Response {
    let headers = req.headers_mut();
    if headers.get("x-request-id").is_none() {
        let request_id = next_request_id();
        headers.insert(
            "x-request-id",
            HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("req")),
        );
    }
    if headers.get("x-correlation-id").is_none() {
        if let Some(req_id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            let value = HeaderValue::from_str(req_id).unwrap_or_else(|_| HeaderValue::from_static("corr"));
            headers.insert("x-correlation-id", value);
        }
    }
    next.run(req).await
}
