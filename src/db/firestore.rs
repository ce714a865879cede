// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed user store.
//!
//! Firestore has no unique constraints, so email/username uniqueness is
//! enforced with insert-only reservation docs in the `identities`
//! collection (`email:<value>` / `username:<value>`, values lowercased and
//! urlencoded). A reservation is written before the user document and
//! released when the user is deleted or changes address; an insert that
//! hits an existing reservation surfaces as `DuplicateIdentity`.

use crate::db::{collections, UserStore};
use crate::error::AppError;
use crate::models::{AssetKind, RemoteAsset, User};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Firestore database client for user accounts.
#[derive(Clone)]
pub struct FirestoreUsers {
    client: Option<firestore::FirestoreDb>,
}

/// Reservation doc mapping an identity to its owning user.
#[derive(Debug, Serialize, Deserialize)]
struct IdentityRef {
    user_id: String,
}

/// Doc ID for an identity reservation, e.g. `email:bob%40example.com`.
fn identity_doc_id(field: &str, value: &str) -> String {
    format!("{}:{}", field, urlencoding::encode(&value.to_lowercase()))
}

impl FirestoreUsers {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Use ExternalJwtFunctionSource to provide a dummy token without needing async-trait
        // or a custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Identity Reservations ───────────────────────────────────

    /// Insert-only write of a reservation doc; an existing doc means the
    /// identity is held by someone.
    async fn reserve_identity(&self, doc_id: &str, user_id: &str) -> Result<(), AppError> {
        let reservation = IdentityRef {
            user_id: user_id.to_string(),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::IDENTITIES)
            .document_id(doc_id)
            .object(&reservation)
            .execute()
            .await
            .map_err(|e| match e {
                firestore::errors::FirestoreError::DataConflictError(_) => {
                    AppError::DuplicateIdentity
                }
                other => AppError::Database(other.to_string()),
            })?;
        Ok(())
    }

    async fn release_identity(&self, doc_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::IDENTITIES)
            .document_id(doc_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Release a reservation where failure must not mask the caller's own
    /// outcome; a leaked reservation is logged for operational follow-up.
    async fn release_identity_logged(&self, doc_id: &str) {
        if let Err(e) = self.release_identity(doc_id).await {
            tracing::warn!(doc_id, error = %e, "Failed to release identity reservation");
        }
    }

    /// Resolve a reservation to its user record, if both still exist.
    async fn find_by_identity_key(&self, doc_id: &str) -> Result<Option<User>, AppError> {
        let reservation: Option<IdentityRef> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::IDENTITIES)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match reservation {
            Some(r) => self.find_by_id(&r.user_id).await,
            None => Ok(None),
        }
    }

    // ─── User Document Writes ────────────────────────────────────

    /// Full-document write. Partial updates go through fetch-modify-write
    /// to preserve other fields.
    async fn upsert(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for FirestoreUsers {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_by_identity_key(&identity_doc_id("email", email))
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.find_by_identity_key(&identity_doc_id("username", username))
            .await
    }

    async fn create(&self, user: &User) -> Result<(), AppError> {
        let email_key = identity_doc_id("email", &user.email);
        let username_key = identity_doc_id("username", &user.username);

        // Reserve both identities first; unwind on partial failure so a
        // rejected registration holds nothing.
        self.reserve_identity(&email_key, &user.id).await?;

        if let Err(e) = self.reserve_identity(&username_key, &user.id).await {
            self.release_identity_logged(&email_key).await;
            return Err(e);
        }

        let insert_result: Result<(), AppError> = async {
            let _: () = self
                .get_client()?
                .fluent()
                .insert()
                .into(collections::USERS)
                .document_id(&user.id)
                .object(user)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            Ok(())
        }
        .await;

        if let Err(e) = insert_result {
            self.release_identity_logged(&email_key).await;
            self.release_identity_logged(&username_key).await;
            return Err(e);
        }

        tracing::debug!(user_id = %user.id, "User record created");
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &str,
        fullname: &str,
        email: &str,
    ) -> Result<User, AppError> {
        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let new_email = email.to_lowercase();
        let email_changed = new_email != user.email;

        if email_changed {
            // Take the new address before touching the record; losing the
            // race here leaves everything as it was.
            let new_key = identity_doc_id("email", &new_email);
            self.reserve_identity(&new_key, id).await?;

            let old_key = identity_doc_id("email", &user.email);
            user.email = new_email;
            user.fullname = fullname.to_string();
            user.updated_at = now_rfc3339();

            if let Err(e) = self.upsert(&user).await {
                self.release_identity_logged(&new_key).await;
                return Err(e);
            }

            self.release_identity_logged(&old_key).await;
        } else {
            user.fullname = fullname.to_string();
            user.updated_at = now_rfc3339();
            self.upsert(&user).await?;
        }

        Ok(user)
    }

    async fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), AppError> {
        let Some(mut user) = self.find_by_id(id).await? else {
            // Logout for an already-deleted user must still succeed.
            tracing::debug!(user_id = id, "Refresh-token write for missing user ignored");
            return Ok(());
        };

        user.refresh_token = token.map(String::from);
        user.updated_at = now_rfc3339();
        self.upsert(&user).await
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        user.password_hash = password_hash.to_string();
        user.updated_at = now_rfc3339();
        self.upsert(&user).await
    }

    async fn set_asset(&self, id: &str, asset: &RemoteAsset) -> Result<User, AppError> {
        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        match asset.kind {
            AssetKind::Avatar => user.avatar = asset.clone(),
            AssetKind::Cover => user.cover = Some(asset.clone()),
        }
        user.updated_at = now_rfc3339();
        self.upsert(&user).await?;
        Ok(user)
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        // Need the record to know which reservations to release.
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(());
        };

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // The record is gone; a leaked reservation only blocks re-use of the
        // identity and is visible in logs.
        self.release_identity_logged(&identity_doc_id("email", &user.email))
            .await;
        self.release_identity_logged(&identity_doc_id("username", &user.username))
            .await;

        tracing::debug!(user_id = id, "User record deleted");
        Ok(())
    }
}
