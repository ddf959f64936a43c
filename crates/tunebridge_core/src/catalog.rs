/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Catalog proxy.
//!
//! Every logical catalog operation owns an ordered list of upstream path
//! templates. A call substitutes the path id, validates required input,
//! then tries the candidates one by one and returns the first 2xx body
//! untouched. Candidates are never raced: the first success wins and the
//! remaining ones are not contacted.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{CatalogError, UpstreamError};
use crate::upstream::{CatalogUpstream, QueryParams, UpstreamPayload};

const ID_PLACEHOLDER: &str = "{id}";

/// How the inbound request is turned into upstream query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPolicy {
    /// `query`/`q` term is mandatory; forwarded under both keys.
    SearchTerm,
    /// Like `SearchTerm`, plus `page` and `limit` when given.
    SearchTermPaged,
    /// Only `id=<path id>`.
    Id,
    /// The inbound query string, as is.
    Forward,
    /// No parameters at all.
    Nothing,
}

#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub name: &'static str,
    /// Route relative to the catalog mount point, in axum syntax.
    pub route: &'static str,
    pub candidates: Vec<String>,
    pub params: ParamPolicy,
    pub failure_message: &'static str,
}

/// Fully prepared outbound request for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub candidates: Vec<String>,
    pub params: QueryParams,
}

impl OperationSpec {
    fn new(
        name: &'static str,
        route: &'static str,
        candidates: &[&str],
        params: ParamPolicy,
        failure_message: &'static str,
    ) -> Self {
        Self {
            name,
            route,
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
            params,
            failure_message,
        }
    }

    pub fn requires_id(&self) -> bool {
        self.params == ParamPolicy::Id || self.candidates.iter().any(|c| c.contains(ID_PLACEHOLDER))
    }

    /// Validates caller input and expands templates. Never touches the network.
    pub fn prepare(&self, id: Option<&str>, query: &[(String, String)]) -> Result<PreparedCall, CatalogError> {
        let id = id.map(str::trim).filter(|s| !s.is_empty());
        if self.requires_id() && id.is_none() {
            return Err(CatalogError::BadRequest("id required"));
        }

        let params = match self.params {
            ParamPolicy::SearchTerm | ParamPolicy::SearchTermPaged => {
                let term = search_term(query).ok_or(CatalogError::BadRequest("query required"))?;
                let mut params: QueryParams = vec![
                    ("query".to_string(), Some(term.clone())),
                    ("q".to_string(), Some(term)),
                ];
                if self.params == ParamPolicy::SearchTermPaged {
                    params.push(("page".to_string(), query_value(query, "page")));
                    params.push(("limit".to_string(), query_value(query, "limit")));
                }
                params
            }
            ParamPolicy::Id => vec![("id".to_string(), id.map(|s| s.to_string()))],
            ParamPolicy::Forward => query.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect(),
            ParamPolicy::Nothing => Vec::new(),
        };

        let candidates = match id {
            Some(id) => {
                let encoded = urlencoding::encode(id);
                self.candidates
                    .iter()
                    .map(|c| c.replace(ID_PLACEHOLDER, &encoded))
                    .collect()
            }
            None => self.candidates.clone(),
        };

        Ok(PreparedCall { candidates, params })
    }
}

fn query_value(query: &[(String, String)], key: &str) -> Option<String> {
    query
        .iter()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.clone())
}

fn search_term(query: &[(String, String)]) -> Option<String> {
    query_value(query, "query").or_else(|| query_value(query, "q"))
}

/// Operation table: logical operation -> ordered upstream path templates.
#[derive(Debug, Clone)]
pub struct CatalogTable {
    operations: Vec<OperationSpec>,
}

impl Default for CatalogTable {
    fn default() -> Self {
        use ParamPolicy::*;
        let operations = vec![
            OperationSpec::new("search", "/search", &["/api/search", "/search"], SearchTerm, "search failed"),
            OperationSpec::new(
                "search songs",
                "/search/songs",
                &["/api/search/songs", "/search/songs", "/search"],
                SearchTermPaged,
                "search songs failed",
            ),
            OperationSpec::new(
                "search albums",
                "/search/albums",
                &["/api/search/albums", "/search/albums", "/search"],
                SearchTermPaged,
                "search albums failed",
            ),
            OperationSpec::new(
                "search artists",
                "/search/artists",
                &["/api/search/artists", "/search/artists", "/search"],
                SearchTermPaged,
                "search artists failed",
            ),
            OperationSpec::new(
                "search playlists",
                "/search/playlists",
                &["/api/search/playlists", "/search/playlists", "/search"],
                SearchTermPaged,
                "search playlists failed",
            ),
            OperationSpec::new("songs", "/songs", &["/api/songs", "/songs"], Forward, "songs failed"),
            OperationSpec::new(
                "song",
                "/songs/:id",
                &["/api/songs/{id}", "/songs/{id}", "/song", "/api/song"],
                Id,
                "song fetch failed",
            ),
            OperationSpec::new(
                "song suggestions",
                "/songs/:id/suggestions",
                &["/api/songs/{id}/suggestions", "/songs/{id}/suggestions"],
                Nothing,
                "song suggestions failed",
            ),
            OperationSpec::new("albums", "/albums", &["/api/albums", "/albums"], Forward, "albums failed"),
            OperationSpec::new(
                "album",
                "/albums/:id",
                &["/api/albums/{id}", "/albums/{id}", "/album", "/api/album"],
                Id,
                "album fetch failed",
            ),
            OperationSpec::new("artists", "/artists", &["/api/artists", "/artists"], Forward, "artists failed"),
            OperationSpec::new(
                "artist",
                "/artists/:id",
                &["/api/artists/{id}", "/artists/{id}", "/artist", "/api/artist"],
                Id,
                "artist fetch failed",
            ),
            OperationSpec::new(
                "artist songs",
                "/artists/:id/songs",
                &["/api/artists/{id}/songs", "/artists/{id}/songs"],
                Forward,
                "artist songs failed",
            ),
            OperationSpec::new(
                "artist albums",
                "/artists/:id/albums",
                &["/api/artists/{id}/albums", "/artists/{id}/albums"],
                Forward,
                "artist albums failed",
            ),
            OperationSpec::new("playlists", "/playlists", &["/api/playlists", "/playlists"], Forward, "playlists failed"),
        ];
        Self { operations }
    }
}

impl CatalogTable {
    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Replaces candidate lists from a JSON object `{"<operation>": ["/path", ...]}`.
    pub fn with_overrides_json(mut self, json: &str) -> Result<Self> {
        let overrides: HashMap<String, Vec<String>> =
            serde_json::from_str(json).context("parse catalog route overrides")?;
        for (name, candidates) in overrides {
            let Some(op) = self.operations.iter_mut().find(|op| op.name == name) else {
                bail!("unknown catalog operation in overrides: {name}");
            };
            if candidates.is_empty() {
                bail!("catalog operation {name} needs at least one candidate");
            }
            if let Some(bad) = candidates.iter().find(|c| !c.starts_with('/')) {
                bail!("catalog candidate for {name} must start with '/': {bad}");
            }
            op.candidates = candidates;
        }
        Ok(self)
    }
}

/// Tries `candidates` strictly in order, returning the first success.
pub async fn resolve(
    upstream: &dyn CatalogUpstream,
    operation: &'static str,
    candidates: &[String],
    params: &QueryParams,
) -> Result<UpstreamPayload, CatalogError> {
    let mut last_error = None;
    for (attempt, path) in candidates.iter().enumerate() {
        debug!(operation, path = %path, attempt = attempt + 1, "trying catalog candidate");
        match upstream.get(path, params).await {
            Ok(payload) => {
                debug!(operation, path = %path, bytes = payload.body.len(), "catalog candidate succeeded");
                return Ok(payload);
            }
            Err(e) => {
                warn!(operation, path = %path, attempt = attempt + 1, error = %e, "catalog candidate failed");
                last_error = Some(e);
            }
        }
    }
    let last = last_error.unwrap_or(UpstreamError::NoCandidates);
    error!(operation, attempts = candidates.len(), last_error = %last, "all catalog candidates failed");
    Err(CatalogError::UpstreamExhausted {
        operation,
        attempts: candidates.len(),
        last,
    })
}

/// Catalog proxy bound to one upstream and one operation table.
#[derive(Clone)]
pub struct CatalogProxy {
    upstream: Arc<dyn CatalogUpstream>,
    table: Arc<CatalogTable>,
}

impl CatalogProxy {
    pub fn new(upstream: Arc<dyn CatalogUpstream>, table: CatalogTable) -> Self {
        Self {
            upstream,
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &CatalogTable {
        &self.table
    }

    pub async fn execute(
        &self,
        op: &OperationSpec,
        id: Option<&str>,
        query: &[(String, String)],
    ) -> Result<UpstreamPayload, CatalogError> {
        let call = op.prepare(id, query)?;
        resolve(self.upstream.as_ref(), op.name, &call.candidates, &call.params).await
    }
}
