// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test fixtures: in-memory stores, app builders and multipart
//! body helpers.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use clipcast::config::Config;
use clipcast::db::UserStore;
use clipcast::error::AppError;
use clipcast::models::{AssetKind, RemoteAsset, User};
use clipcast::routes::create_router;
use clipcast::services::{passwords, AccountService, AssetStore, LocalStage, TokenService};
use clipcast::time_utils::now_rfc3339;
use clipcast::AppState;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a store backed by the Firestore emulator.
#[allow(dead_code)]
pub async fn test_users() -> clipcast::db::FirestoreUsers {
    clipcast::db::FirestoreUsers::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── In-memory user store ────────────────────────────────────

/// In-memory `UserStore` with the same observable semantics as the
/// Firestore one: unique identities, last-writer-wins refresh slot,
/// no-op deletes for absent records. The flags inject storage failures.
#[derive(Default)]
pub struct MemoryUsers {
    records: Mutex<HashMap<String, User>>,
    /// Fail `create` with a storage error.
    pub fail_create: AtomicBool,
    /// Fail `create` as a lost identity race, after pre-checks passed.
    pub conflict_on_create: AtomicBool,
    /// Report `create` success without storing the record.
    pub drop_created_record: AtomicBool,
}

impl MemoryUsers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[allow(dead_code)]
    pub fn user_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn get(&self, id: &str) -> Option<User> {
        self.records.lock().unwrap().get(id).cloned()
    }

    /// Insert directly, bypassing the registration saga.
    #[allow(dead_code)]
    pub fn insert(&self, user: User) {
        self.records.lock().unwrap().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let needle = email.to_lowercase();
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == needle)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let needle = username.to_lowercase();
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|u| u.username == needle)
            .cloned())
    }

    async fn create(&self, user: &User) -> Result<(), AppError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::Database("injected create failure".to_string()));
        }
        if self.conflict_on_create.load(Ordering::SeqCst) {
            return Err(AppError::DuplicateIdentity);
        }

        let mut records = self.records.lock().unwrap();
        let taken = records
            .values()
            .any(|u| u.email == user.email || u.username == user.username);
        if taken {
            return Err(AppError::DuplicateIdentity);
        }

        if self.drop_created_record.load(Ordering::SeqCst) {
            return Ok(());
        }
        records.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_profile(&self, id: &str, fullname: &str, email: &str) -> Result<User, AppError> {
        let email = email.to_lowercase();
        let mut records = self.records.lock().unwrap();
        if records.values().any(|u| u.id != id && u.email == email) {
            return Err(AppError::DuplicateIdentity);
        }
        let user = records
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        user.fullname = fullname.to_string();
        user.email = email;
        user.updated_at = now_rfc3339();
        Ok(user.clone())
    }

    async fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), AppError> {
        if let Some(user) = self.records.lock().unwrap().get_mut(id) {
            user.refresh_token = token.map(str::to_string);
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        let user = records
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = now_rfc3339();
        Ok(())
    }

    async fn set_asset(&self, id: &str, asset: &RemoteAsset) -> Result<User, AppError> {
        let mut records = self.records.lock().unwrap();
        let user = records
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        match asset.kind {
            AssetKind::Avatar => user.avatar = asset.clone(),
            AssetKind::Cover => user.cover = Some(asset.clone()),
        }
        user.updated_at = now_rfc3339();
        Ok(user.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.records.lock().unwrap().remove(id);
        Ok(())
    }
}

// ─── Recording asset store ───────────────────────────────────

/// `AssetStore` fake that records uploads and deletes instead of talking
/// to Cloudinary.
#[derive(Default)]
pub struct RecordingAssets {
    seq: AtomicU64,
    pub uploads: Mutex<Vec<RemoteAsset>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_avatar_upload: AtomicBool,
    pub fail_cover_upload: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl RecordingAssets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[allow(dead_code)]
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn uploaded(&self) -> Vec<RemoteAsset> {
        self.uploads.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for RecordingAssets {
    async fn upload(&self, kind: AssetKind, local_path: &Path) -> Result<RemoteAsset, AppError> {
        let failed = match kind {
            AssetKind::Avatar => self.fail_avatar_upload.load(Ordering::SeqCst),
            AssetKind::Cover => self.fail_cover_upload.load(Ordering::SeqCst),
        };
        if failed {
            return Err(AppError::AssetUpload(format!(
                "injected {} upload failure",
                kind.as_str()
            )));
        }
        // The real store reads the staged file off disk; insist it exists.
        if tokio::fs::metadata(local_path).await.is_err() {
            return Err(AppError::AssetUpload(format!(
                "staged file missing: {}",
                local_path.display()
            )));
        }

        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let public_id = format!("clipcast/{}/{}", kind.as_str(), n);
        let asset = RemoteAsset {
            kind,
            url: format!(
                "https://res.cloudinary.com/test-cloud/image/upload/v1/{}.png",
                public_id
            ),
            public_id,
        };
        self.uploads.lock().unwrap().push(asset.clone());
        Ok(asset)
    }

    async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::AssetDelete(
                "injected delete failure".to_string(),
            ));
        }
        self.deletes.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

// ─── App builders ────────────────────────────────────────────

/// Handles onto the app's innards for assertions. Keeps the staging
/// directory alive for the duration of the test.
pub struct TestContext {
    pub state: Arc<AppState>,
    pub users: Arc<MemoryUsers>,
    pub assets: Arc<RecordingAssets>,
    #[allow(dead_code)]
    pub upload_dir: tempfile::TempDir,
}

/// Create a test app with in-memory stores and a temp staging dir.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, TestContext) {
    create_test_app_with_frontend_url("http://localhost:5173").await
}

#[allow(dead_code)]
pub async fn create_test_app_with_frontend_url(frontend_url: &str) -> (axum::Router, TestContext) {
    let upload_dir = tempfile::tempdir().expect("Failed to create staging dir");

    let mut config = Config::default();
    config.frontend_url = frontend_url.to_string();
    config.upload_dir = upload_dir.path().to_path_buf();

    let users = MemoryUsers::new();
    let assets = RecordingAssets::new();
    let stage = LocalStage::new(&config.upload_dir);

    let users_dyn: Arc<dyn UserStore> = users.clone();
    let assets_dyn: Arc<dyn AssetStore> = assets.clone();

    let tokens =
        TokenService::new(&config, users_dyn.clone()).expect("Failed to build token service");
    let accounts = AccountService::new(users_dyn.clone(), assets_dyn, stage.clone());

    let state = Arc::new(AppState {
        config,
        users: users_dyn,
        stage,
        tokens,
        accounts,
    });

    (
        create_router(state.clone()),
        TestContext {
            state,
            users,
            assets,
            upload_dir,
        },
    )
}

// ─── Request helpers ─────────────────────────────────────────

pub const TEST_BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

#[allow(dead_code)]
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Stand-in image bytes; the handlers never parse image content.
#[allow(dead_code)]
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

#[allow(dead_code)]
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={TEST_BOUNDARY}")
}

/// Build a multipart/form-data body by hand.
#[allow(dead_code)]
pub fn multipart_body(text_fields: &[(&str, &str)], file_fields: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in text_fields {
        body.extend_from_slice(format!("--{TEST_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, filename, data) in file_fields {
        body.extend_from_slice(format!("--{TEST_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{TEST_BOUNDARY}--\r\n").as_bytes());
    body
}

/// Registration body with valid fields; avatar and cover are optional so
/// tests can exercise the missing-asset paths.
#[allow(dead_code)]
pub fn register_body(email: &str, username: &str, avatar: bool, cover: bool) -> Vec<u8> {
    let text = [
        ("fullname", "Test User"),
        ("email", email),
        ("username", username),
        ("password", TEST_PASSWORD),
    ];
    let mut files: Vec<(&str, &str, &[u8])> = Vec::new();
    if avatar {
        files.push(("avatar", "avatar.png", FAKE_PNG));
    }
    if cover {
        files.push(("cover", "cover.png", FAKE_PNG));
    }
    multipart_body(&text, &files)
}

/// Insert a user directly into the store, bypassing the saga.
#[allow(dead_code)]
pub fn seed_user(users: &MemoryUsers, email: &str, username: &str, password: &str) -> User {
    let user = User {
        id: format!("user-{}", username),
        email: email.to_lowercase(),
        username: username.to_lowercase(),
        fullname: "Seeded User".to_string(),
        password_hash: passwords::hash_password(password).expect("Failed to hash password"),
        avatar: RemoteAsset {
            kind: AssetKind::Avatar,
            public_id: format!("clipcast/avatar/seed-{}", username),
            url: format!(
                "https://res.cloudinary.com/test-cloud/image/upload/v1/clipcast/avatar/seed-{}.png",
                username
            ),
        },
        cover: None,
        refresh_token: None,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    };
    users.insert(user.clone());
    user
}

/// Log in through the API; panics on anything but 200.
/// Returns (access_token, refresh_token).
#[allow(dead_code)]
pub async fn login_tokens(app: &axum::Router, email: &str, password: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": email, "password": password}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "login should succeed");

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (
        json["access_token"].as_str().unwrap().to_string(),
        json["refresh_token"].as_str().unwrap().to_string(),
    )
}
