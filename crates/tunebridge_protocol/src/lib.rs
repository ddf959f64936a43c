/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Wire bodies exchanged between the relay and its clients.

use serde::{Deserialize, Serialize};

/// `{"message": ..}` body used for successes without payload and for 4xx/502 answers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{"error": ..}` body used for unexpected server-side failures.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

// Account fields are optional on the wire so that missing ones produce a
// domain 400 instead of a deserializer rejection.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserView {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

/// Claims carried by issued bearer tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub id: String,
    pub iat: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthorizedResponse {
    pub message: String,
    pub user: TokenClaims,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_tolerates_missing_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.c"}"#).unwrap();
        assert_eq!(req.email.as_deref(), Some("a@b.c"));
        assert!(req.password.is_none());
        assert!(req.name.is_none());
    }

    #[test]
    fn login_response_shape() {
        let resp = LoginResponse {
            token: "t".to_string(),
            user: UserView {
                id: "u1".to_string(),
                name: Some("Ana".to_string()),
                email: "ana@example.com".to_string(),
            },
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["token"], "t");
        assert_eq!(v["user"]["email"], "ana@example.com");
    }
}
