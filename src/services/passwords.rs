// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing (PBKDF2-HMAC-SHA256).
//!
//! Hashes are stored as `pbkdf2-sha256$<iterations>$<salt>$<digest>` with
//! base64url fields, so the iteration count can be raised later without
//! invalidating existing credentials.

use crate::error::{AppError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::SecureRandom;
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = ring::digest::SHA256_OUTPUT_LEN;

static ALGORITHM: ring::pbkdf2::Algorithm = ring::pbkdf2::PBKDF2_HMAC_SHA256;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let rng = ring::rand::SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to generate password salt")))?;

    let mut digest = [0u8; DIGEST_LEN];
    ring::pbkdf2::derive(
        ALGORITHM,
        NonZeroU32::new(ITERATIONS).unwrap_or(NonZeroU32::MIN),
        &salt,
        password.as_bytes(),
        &mut digest,
    );

    Ok(format!(
        "{}${}${}${}",
        SCHEME,
        ITERATIONS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    ))
}

/// Check a password against an encoded hash.
///
/// Returns false for a mismatch and for any hash this build cannot parse;
/// the caller treats both as bad credentials.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    if parts.next() != Some(SCHEME) {
        return false;
    }
    let Some(iterations) = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .and_then(NonZeroU32::new)
    else {
        return false;
    };
    let Some(salt) = parts.next().and_then(|s| URL_SAFE_NO_PAD.decode(s).ok()) else {
        return false;
    };
    let Some(digest) = parts.next().and_then(|s| URL_SAFE_NO_PAD.decode(s).ok()) else {
        return false;
    };
    if parts.next().is_some() {
        return false;
    }

    ring::pbkdf2::verify(ALGORITHM, iterations, &salt, password.as_bytes(), &digest).is_ok()
}

/// [`hash_password`] on the blocking pool; this iteration count is
/// deliberate CPU work that must not stall the runtime.
pub async fn hash_password_async(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_async(password: String, encoded: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password check task failed: {}", e)))
}
