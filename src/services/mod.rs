// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accounts;
pub mod assets;
pub mod passwords;
pub mod stage;
pub mod tokens;

pub use accounts::AccountService;
pub use assets::{AssetStore, CloudinaryStore};
pub use stage::{LocalStage, StagedFile};
pub use tokens::{TokenPair, TokenService};

use crate::error::{AppError, Result};
use ring::rand::SecureRandom;

/// Random hex string carrying `bytes` bytes of entropy; used for user IDs
/// and token IDs.
pub(crate) fn random_hex(bytes: usize) -> Result<String> {
    let rng = ring::rand::SystemRandom::new();
    let mut buf = vec![0u8; bytes];
    rng.fill(&mut buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Random generator failure")))?;
    Ok(hex::encode(buf))
}
