/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Error taxonomy shared by the catalog proxy, the stream relay and accounts.

use thiserror::Error;

/// Failure of a single outbound attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream {path} answered with status {status}")]
    Status { path: String, status: u16 },

    #[error("upstream {path} timed out")]
    Timeout { path: String },

    #[error("upstream {path} unreachable: {message}")]
    Transport { path: String, message: String },

    #[error("no candidate paths configured")]
    NoCandidates,
}

impl UpstreamError {
    pub fn from_reqwest(path: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status {
                path: path.to_string(),
                status: status.as_u16(),
            };
        }
        if err.is_timeout() {
            return Self::Timeout {
                path: path.to_string(),
            };
        }
        Self::Transport {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Caller input was rejected before any outbound call.
    #[error("{0}")]
    BadRequest(&'static str),

    /// Every candidate failed; carries the last recorded failure.
    #[error("{operation}: all {attempts} candidates failed, last: {last}")]
    UpstreamExhausted {
        operation: &'static str,
        attempts: usize,
        last: UpstreamError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("url required")]
    MissingUrl,

    #[error("invalid url")]
    InvalidUrl,

    #[error("invalid protocol")]
    InvalidProtocol,

    /// The upstream answered with a non-success status before streaming began.
    #[error("upstream answered with status {0}")]
    UpstreamStatus(u16),

    /// The upstream could not be reached (connect, dns, tls, timeout).
    #[error("upstream fetch failed: {0}")]
    Upstream(String),
}

impl RelayError {
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::MissingUrl | Self::InvalidUrl | Self::InvalidProtocol)
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("email and password required")]
    MissingFields,

    #[error("User already exists")]
    AlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("No token, authorization denied")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_messages_match_wire_contract() {
        assert_eq!(CatalogError::BadRequest("query required").to_string(), "query required");
        assert_eq!(RelayError::InvalidProtocol.to_string(), "invalid protocol");
        assert_eq!(RelayError::InvalidUrl.to_string(), "invalid url");
        assert!(RelayError::MissingUrl.is_bad_request());
        assert!(!RelayError::UpstreamStatus(404).is_bad_request());
    }

    #[test]
    fn exhausted_keeps_last_error() {
        let err = CatalogError::UpstreamExhausted {
            operation: "search",
            attempts: 2,
            last: UpstreamError::Status {
                path: "/search".to_string(),
                status: 503,
            },
        };
        let CatalogError::UpstreamExhausted { last, .. } = &err else {
            panic!("expected exhausted");
        };
        assert_eq!(last.status(), Some(503));
        assert!(err.to_string().contains("/search"));
    }
}
