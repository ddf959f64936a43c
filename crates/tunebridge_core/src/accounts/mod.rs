/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Registration, login and bearer-token checks.

pub mod password;
pub mod store;
pub mod token;

use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use tracing::info;
use tunebridge_protocol::{LoginRequest, LoginResponse, RegisterRequest, TokenClaims, UserView};

use crate::error::AccountError;
use crate::now_ms;
pub use password::PasswordHasher;
pub use store::{CreateOutcome, MemoryUserStore, SqliteUserStore, UserRecord, UserStore};
pub use token::TokenSigner;

fn generate_user_id() -> String {
    let mut buf = [0u8; 12];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

fn required(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    signer: TokenSigner,
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher, signer: TokenSigner) -> Self {
        Self { store, hasher, signer }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<UserView, AccountError> {
        let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
            return Err(AccountError::MissingFields);
        };
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AccountError::AlreadyExists);
        }

        let password_hash = self.hasher.hash(&password).await?;
        let record = UserRecord {
            id: generate_user_id(),
            name: req.name,
            email,
            password_hash,
            created_at_ms: now_ms(),
        };
        let view = UserView {
            id: record.id.clone(),
            name: record.name.clone(),
            email: record.email.clone(),
        };
        match self.store.create(record).await? {
            CreateOutcome::Created => {
                info!(user_id = %view.id, "user registered");
                Ok(view)
            }
            // Lost a race with a concurrent registration.
            CreateOutcome::EmailTaken => Err(AccountError::AlreadyExists),
        }
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AccountError> {
        let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
            return Err(AccountError::MissingFields);
        };
        let Some(user) = self.store.find_by_email(&email).await? else {
            return Err(AccountError::UserNotFound);
        };
        if !self.hasher.verify(&password, &user.password_hash).await? {
            return Err(AccountError::InvalidPassword);
        }

        let token = self.signer.sign(&user.id, now_ms() / 1000)?;
        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse {
            token,
            user: UserView {
                id: user.id,
                name: user.name,
                email: user.email,
            },
        })
    }

    /// Checks an `Authorization` header value of the form `Bearer <token>`.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<TokenClaims, AccountError> {
        let token = authorization
            .and_then(|v| v.split_whitespace().nth(1))
            .ok_or(AccountError::MissingToken)?;
        self.signer.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(MemoryUserStore::new()),
            PasswordHasher::new(4),
            TokenSigner::new("test-secret"),
        )
    }

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: Some("Ana".to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn register_login_authorize() {
        let svc = service();
        let user = svc.register(register_req("ana@example.com", "pw")).await.unwrap();
        assert_eq!(user.id.len(), 24);

        let resp = svc.login(login_req("ana@example.com", "pw")).await.unwrap();
        assert_eq!(resp.user, user);

        let header = format!("Bearer {}", resp.token);
        let claims = svc.authorize(Some(&header)).unwrap();
        assert_eq!(claims.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let svc = service();
        svc.register(register_req("dup@example.com", "pw")).await.unwrap();
        let err = svc.register(register_req("dup@example.com", "other")).await.unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists));
    }

    #[tokio::test]
    async fn login_failures_are_distinguished() {
        let svc = service();
        svc.register(register_req("ana@example.com", "pw")).await.unwrap();
        assert!(matches!(
            svc.login(login_req("nobody@example.com", "pw")).await,
            Err(AccountError::UserNotFound)
        ));
        assert!(matches!(
            svc.login(login_req("ana@example.com", "nope")).await,
            Err(AccountError::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let svc = service();
        let err = svc
            .register(RegisterRequest {
                name: Some("x".to_string()),
                email: Some("x@example.com".to_string()),
                password: Some("   ".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::MissingFields));
        assert!(matches!(svc.login(LoginRequest::default()).await, Err(AccountError::MissingFields)));
    }

    #[test]
    fn authorize_requires_bearer_token() {
        let svc = service();
        assert!(matches!(svc.authorize(None), Err(AccountError::MissingToken)));
        assert!(matches!(svc.authorize(Some("Bearer")), Err(AccountError::MissingToken)));
        assert!(matches!(svc.authorize(Some("Bearer junk")), Err(AccountError::InvalidToken)));
    }
}
