/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;
use tunebridge_core::error::{AccountError, CatalogError, RelayError};
use tunebridge_protocol::{ErrorBody, MessageBody};

/// Domain failures as seen by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    Catalog {
        failure_message: &'static str,
        error: CatalogError,
    },
    Relay(RelayError),
    Account(AccountError),
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        Self::Account(e)
    }
}

fn message(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(MessageBody::new(msg))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Catalog { failure_message, error } => match error {
                CatalogError::BadRequest(msg) => message(StatusCode::BAD_REQUEST, msg),
                CatalogError::UpstreamExhausted { .. } => message(StatusCode::BAD_GATEWAY, failure_message),
            },
            ApiError::Relay(e) if e.is_bad_request() => message(StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Relay(RelayError::UpstreamStatus(status)) => {
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                message(status, "stream failed")
            }
            ApiError::Relay(_) => message(StatusCode::BAD_GATEWAY, "stream failed"),
            ApiError::Account(e) => match e {
                AccountError::MissingFields
                | AccountError::AlreadyExists
                | AccountError::UserNotFound
                | AccountError::InvalidPassword => message(StatusCode::BAD_REQUEST, e.to_string()),
                AccountError::MissingToken | AccountError::InvalidToken => {
                    message(StatusCode::UNAUTHORIZED, e.to_string())
                }
                AccountError::Internal(err) => {
                    error!("account operation failed: {err:#}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorBody {
                            error: "internal server error".to_string(),
                        }),
                    )
                        .into_response()
                }
            },
        }
    }
}
