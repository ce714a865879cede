// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session-token lifecycle: mint, verify, rotate, revoke.
//!
//! Two HS256-signed JWTs per session: a short-lived access token that is
//! verified statelessly, and a long-lived refresh token that is only valid
//! while it is byte-equal to the single persisted slot on the user record.
//! Minting overwrites that slot, so rotation and login both retire the
//! previous refresh token as a side effect.
//!
//! Known limitation, kept deliberately: two concurrent refreshes with the
//! same still-valid token can both pass the slot check before either
//! writes; the later write wins and the loser's fresh pair is silently
//! superseded. Single slot, last writer wins.

use crate::config::Config;
use crate::db::UserStore;
use crate::error::{AppError, Result};
use hkdf::Hkdf;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// HKDF info labels; distinct per token class so the two keys can never
/// validate each other's tokens.
const ACCESS_KEY_INFO: &[u8] = b"clipcast access token v1";
const REFRESH_KEY_INFO: &[u8] = b"clipcast refresh token v1";
const DERIVED_KEY_LEN: usize = 32;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct Claims {
    /// Subject (user ID)
    sub: String,
    /// Expiration time (Unix timestamp)
    exp: usize,
    /// Issued at (Unix timestamp)
    iat: usize,
    /// Random token ID; two mints in the same second still differ
    jti: String,
}

/// Freshly minted access + refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies the session-token pair; owns the persisted refresh
/// slot via the user store.
#[derive(Clone)]
pub struct TokenService {
    users: Arc<dyn UserStore>,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    /// Derive both signing keys from the configured root key and bind the
    /// service to its user store.
    pub fn new(config: &Config, users: Arc<dyn UserStore>) -> Result<Self> {
        let access_key = derive_key(&config.jwt_signing_key, ACCESS_KEY_INFO)?;
        let refresh_key = derive_key(&config.jwt_signing_key, REFRESH_KEY_INFO)?;

        Ok(Self {
            users,
            access_encoding: EncodingKey::from_secret(&access_key),
            access_decoding: DecodingKey::from_secret(&access_key),
            refresh_encoding: EncodingKey::from_secret(&refresh_key),
            refresh_decoding: DecodingKey::from_secret(&refresh_key),
            access_ttl_secs: config.access_ttl_secs(),
            refresh_ttl_secs: config.refresh_ttl_secs(),
        })
    }

    /// Mint a fresh token pair for a user and persist the refresh token.
    ///
    /// The slot is overwritten unconditionally, so any refresh token issued
    /// earlier for this user stops working here.
    pub async fn mint(&self, user_id: &str) -> Result<TokenPair> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let access_token =
            self.encode_token(&user.id, self.access_ttl_secs, &self.access_encoding)?;
        let refresh_token =
            self.encode_token(&user.id, self.refresh_ttl_secs, &self.refresh_encoding)?;

        self.users
            .set_refresh_token(&user.id, Some(&refresh_token))
            .await?;

        tracing::debug!(user_id = %user.id, "Minted token pair");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token and return the subject user ID.
    ///
    /// Purely signature + expiry; storage is never consulted, so revocation
    /// does not affect an access token for its remaining minutes.
    pub fn verify_access(&self, token: &str) -> Result<String> {
        let claims = decode_token(token, &self.access_decoding)?;
        Ok(claims.sub)
    }

    /// Verify a refresh token and rotate the pair.
    ///
    /// The token must carry a valid signature and expiry under the refresh
    /// key AND match the persisted slot byte for byte. A vanished user, an
    /// empty slot and a superseded token all fail the same way.
    pub async fn verify_refresh_and_rotate(&self, token: &str) -> Result<TokenPair> {
        let claims = decode_token(token, &self.refresh_decoding)?;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AppError::TokenRevoked)?;

        let valid = user
            .refresh_token
            .as_deref()
            .is_some_and(|current| bool::from(current.as_bytes().ct_eq(token.as_bytes())));

        if !valid {
            tracing::debug!(user_id = %claims.sub, "Refresh token does not match persisted slot");
            return Err(AppError::TokenRevoked);
        }

        self.mint(&user.id).await
    }

    /// Clear the persisted refresh slot. Idempotent: revoking a user who is
    /// already logged out, or already deleted, succeeds.
    pub async fn revoke(&self, user_id: &str) -> Result<()> {
        self.users.set_refresh_token(user_id, None).await?;
        tracing::debug!(user_id, "Refresh token revoked");
        Ok(())
    }

    fn encode_token(&self, user_id: &str, ttl_secs: i64, key: &EncodingKey) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now as usize,
            exp: (now + ttl_secs) as usize,
            jti: super::random_hex(16)?,
        };

        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Token encoding failed: {}", e)))
    }
}

fn decode_token(token: &str, key: &DecodingKey) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    match decode::<Claims>(token, key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AppError::TokenExpired),
            _ => Err(AppError::TokenInvalid),
        },
    }
}

/// HKDF-SHA256 expansion of the root key under a class-specific label.
fn derive_key(root: &[u8], info: &[u8]) -> Result<[u8; DERIVED_KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, root);
    let mut okm = [0u8; DERIVED_KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Signing-key derivation failed")))?;
    Ok(okm)
}
