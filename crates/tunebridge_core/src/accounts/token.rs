/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Compact HS256 JWTs carrying `{id, iat}`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tunebridge_protocol::TokenClaims;

use crate::error::AccountError;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(serde::Deserialize)]
struct Header {
    alg: String,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Signer with a fresh random secret.
    pub fn ephemeral() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::new(secret)
    }

    fn mac(&self) -> Result<HmacSha256, AccountError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AccountError::Internal(anyhow::anyhow!("token key: {e}")))
    }

    pub fn sign(&self, user_id: &str, issued_at_secs: i64) -> Result<String, AccountError> {
        let claims = TokenClaims {
            id: user_id.to_string(),
            iat: issued_at_secs,
        };
        let payload = serde_json::to_vec(&claims).map_err(|e| AccountError::Internal(e.into()))?;
        let signing_input = format!("{}.{}", B64URL.encode(HEADER_JSON), B64URL.encode(payload));
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let sig = mac.finalize().into_bytes();
        Ok(format!("{signing_input}.{}", B64URL.encode(sig)))
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, AccountError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AccountError::InvalidToken);
        };

        let header: Header = B64URL
            .decode(header_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(AccountError::InvalidToken)?;
        if header.alg != "HS256" {
            return Err(AccountError::InvalidToken);
        }

        let sig = B64URL.decode(sig_b64).map_err(|_| AccountError::InvalidToken)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
        mac.verify_slice(&sig).map_err(|_| AccountError::InvalidToken)?;

        B64URL
            .decode(payload_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice::<TokenClaims>(&raw).ok())
            .ok_or(AccountError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_token_round_trips_claims() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign("64f0c0ffee", 1_700_000_000).unwrap();
        assert_eq!(token.matches('.').count(), 2);
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.id, "64f0c0ffee");
        assert_eq!(claims.iat, 1_700_000_000);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenSigner::new("a").sign("u1", 1).unwrap();
        assert!(matches!(TokenSigner::new("b").verify(&token), Err(AccountError::InvalidToken)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign("u1", 1).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = B64URL.encode(r#"{"id":"admin","iat":1}"#);
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);
        assert!(matches!(signer.verify(&tampered), Err(AccountError::InvalidToken)));
    }

    #[test]
    fn garbage_is_rejected() {
        let signer = TokenSigner::ephemeral();
        for bad in ["", "abc", "a.b", "a.b.c.d", "...", "eyJhbGciOiJub25lIn0.e30."] {
            assert!(matches!(signer.verify(bad), Err(AccountError::InvalidToken)), "{bad}");
        }
    }
}
