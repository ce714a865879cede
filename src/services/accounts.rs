// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account creation saga and asset replacement.
//!
//! Account creation is a multi-step operation with no transaction around
//! it: local stage → remote uploads → database commit. Each completed step
//! records its rollback in an undo log; any later failure runs the log in
//! reverse (user record first, then assets) before the original error is
//! surfaced. Compensation is best-effort: a failed compensating delete is
//! logged with enough context to find the orphan and never replaces the
//! error the caller gets. Staged files are owned by guards, so they are
//! gone by the end of the request on every path.

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::models::{AssetKind, NewAccount, RemoteAsset, User};
use crate::services::assets::AssetStore;
use crate::services::passwords;
use crate::services::stage::{LocalStage, StagedFile};
use crate::time_utils::now_rfc3339;
use std::sync::Arc;
use validator::Validate;

/// Rollback entry recorded after a step commits, undone in reverse order.
enum Undo {
    Asset(RemoteAsset),
    UserRecord(String),
}

/// Orchestrates user store, asset store and local stage for registration
/// and asset replacement.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    assets: Arc<dyn AssetStore>,
    stage: LocalStage,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, assets: Arc<dyn AssetStore>, stage: LocalStage) -> Self {
        Self {
            users,
            assets,
            stage,
        }
    }

    /// Create an account from validated fields and staged upload(s).
    ///
    /// Returns the record as committed to storage. On failure, every remote
    /// asset and record this call created has had a compensating delete
    /// issued, and the staged files are gone either way.
    pub async fn create_account(
        &self,
        fields: NewAccount,
        avatar: Option<StagedFile>,
        cover: Option<StagedFile>,
    ) -> Result<User> {
        // Step 1: everything that can reject the request before any side
        // effect happens; identity uniqueness is checked before the avatar.
        // Password hashing is included so that the window between first
        // upload and commit contains no failure point that lacks a
        // compensation.
        fields
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let NewAccount {
            fullname,
            email,
            username,
            password,
        } = fields;
        let email = email.to_lowercase();
        let username = username.to_lowercase();

        if self.users.find_by_email(&email).await?.is_some()
            || self.users.find_by_username(&username).await?.is_some()
        {
            return Err(AppError::DuplicateIdentity);
        }

        let avatar_file = avatar.ok_or(AppError::MissingAsset("avatar file"))?;
        if !self.stage.exists(avatar_file.path()).await {
            return Err(AppError::MissingAsset("avatar file"));
        }

        let password_hash = passwords::hash_password_async(password).await?;

        let mut undo: Vec<Undo> = Vec::new();

        // Step 2: avatar upload. Nothing remote exists yet, so a failure
        // here only needs the staged-file guards, which run on return.
        let avatar_asset = self
            .assets
            .upload(AssetKind::Avatar, avatar_file.path())
            .await?;
        undo.push(Undo::Asset(avatar_asset.clone()));

        // Step 3: optional cover upload; from here on a failure must unwind
        // the avatar too.
        let cover_asset = match &cover {
            Some(file) => match self.assets.upload(AssetKind::Cover, file.path()).await {
                Ok(asset) => {
                    undo.push(Undo::Asset(asset.clone()));
                    Some(asset)
                }
                Err(e) => {
                    self.run_undo(&undo).await;
                    return Err(e);
                }
            },
            None => None,
        };

        // Step 4: the staged files served their purpose no matter how the
        // commit goes. Removal failures are logged, not raised; the sweep
        // will catch anything left behind.
        if let Err(e) = avatar_file.discard().await {
            tracing::warn!(error = %e, "Failed to discard staged avatar");
        }
        if let Some(file) = cover {
            if let Err(e) = file.discard().await {
                tracing::warn!(error = %e, "Failed to discard staged cover");
            }
        }

        // Step 5: commit. A failure here includes losing an identity race
        // to a concurrent registration; either way the uploads are unwound.
        let user_id = super::random_hex(16)?;
        let now = now_rfc3339();
        let user = User {
            id: user_id,
            email,
            username,
            fullname,
            password_hash,
            avatar: avatar_asset,
            cover: cover_asset,
            refresh_token: None,
            created_at: now.clone(),
            updated_at: now,
        };

        if let Err(e) = self.users.create(&user).await {
            self.run_undo(&undo).await;
            return Err(AppError::AccountCreation(format!("Commit failed: {}", e)));
        }
        undo.push(Undo::UserRecord(user.id.clone()));

        // Step 6: the response reflects what storage holds, not what we
        // meant to write. If the committed record cannot be read back the
        // whole registration is unwound, record included.
        match self.users.find_by_id(&user.id).await {
            Ok(Some(created)) => {
                tracing::info!(
                    user_id = %created.id,
                    username = %created.username,
                    "Account created"
                );
                Ok(created)
            }
            Ok(None) => {
                self.run_undo(&undo).await;
                Err(AppError::AccountCreation(
                    "Created record could not be read back".to_string(),
                ))
            }
            Err(e) => {
                self.run_undo(&undo).await;
                Err(AppError::AccountCreation(format!("Read-back failed: {}", e)))
            }
        }
    }

    /// Upload a replacement avatar or cover and persist it on the record.
    ///
    /// A failed persist unwinds the fresh upload with the same best-effort
    /// discipline as registration.
    pub async fn replace_asset(
        &self,
        user_id: &str,
        kind: AssetKind,
        file: StagedFile,
    ) -> Result<User> {
        // On upload failure the guard removes the staged file.
        let asset = self.assets.upload(kind, file.path()).await?;

        if let Err(e) = file.discard().await {
            tracing::warn!(error = %e, "Failed to discard staged file");
        }

        match self.users.set_asset(user_id, &asset).await {
            Ok(user) => {
                // TODO: the replaced asset stays in the object store; delete
                // it here once upload provenance is recorded on the user.
                tracing::info!(
                    user_id,
                    kind = kind.as_str(),
                    public_id = %asset.public_id,
                    "Asset replaced"
                );
                Ok(user)
            }
            Err(e) => {
                if let Err(del) = self.assets.delete(&asset.public_id).await {
                    tracing::warn!(
                        public_id = %asset.public_id,
                        kind = kind.as_str(),
                        error = %del,
                        "Compensating delete failed; asset may be orphaned"
                    );
                }
                Err(e)
            }
        }
    }

    /// Undo completed steps in reverse order. Failures are logged with the
    /// asset context and never override the error the caller is getting.
    async fn run_undo(&self, undo: &[Undo]) {
        for entry in undo.iter().rev() {
            match entry {
                Undo::Asset(asset) => {
                    if let Err(e) = self.assets.delete(&asset.public_id).await {
                        tracing::warn!(
                            public_id = %asset.public_id,
                            kind = asset.kind.as_str(),
                            error = %e,
                            "Compensating delete failed; asset may be orphaned"
                        );
                    }
                }
                Undo::UserRecord(id) => {
                    if let Err(e) = self.users.delete(id).await {
                        tracing::warn!(
                            user_id = %id,
                            error = %e,
                            "Compensating user delete failed"
                        );
                    }
                }
            }
        }
    }
}
