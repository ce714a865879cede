// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account routes for the logged-in user. All of these sit behind the
//! access-token middleware and act on the authenticated user only.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AssetKind, UserResponse};
use crate::routes::{stage_upload_field, MAX_UPLOAD_BYTES};
use crate::services::passwords;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/account", patch(update_account))
        .route("/api/account/password", post(change_password))
        .route(
            "/api/account/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/account/cover",
            patch(update_cover).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

/// Return the authenticated user's profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let record = state
        .users
        .find_by_id(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(record.into()))
}

// ─── Profile details ─────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 100, message = "fullname must be 1-100 characters"))]
    fullname: String,
    #[validate(email(message = "email must be a valid address"))]
    email: String,
}

/// Update fullname and email. Both fields are required; a changed email
/// must still be unique across accounts.
async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<UserResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let updated = state
        .users
        .update_profile(&user.user_id, &payload.fullname, &payload.email)
        .await?;

    tracing::info!(user_id = %user.user_id, "Account details updated");

    Ok(Json(updated.into()))
}

// ─── Password ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct ChangePasswordRequest {
    old_password: String,
    #[validate(length(min = 1, max = 128, message = "password must be 1-128 characters"))]
    new_password: String,
}

/// Change the password after re-proving the old one. Existing sessions
/// stay valid; only future logins use the new hash.
async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let record = state
        .users
        .find_by_id(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    let old_ok =
        passwords::verify_password_async(payload.old_password, record.password_hash).await?;
    if !old_ok {
        return Err(AppError::InvalidCredentials);
    }

    let new_hash = passwords::hash_password_async(payload.new_password).await?;
    state
        .users
        .set_password_hash(&user.user_id, &new_hash)
        .await?;

    tracing::info!(user_id = %user.user_id, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

// ─── Assets ──────────────────────────────────────────────────

async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<UserResponse>> {
    replace_asset(state, user, AssetKind::Avatar, "avatar", multipart).await
}

async fn update_cover(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<UserResponse>> {
    replace_asset(state, user, AssetKind::Cover, "cover", multipart).await
}

/// Stage the uploaded file and run the replacement through the account
/// service, which owns upload and cleanup.
async fn replace_asset(
    state: Arc<AppState>,
    user: AuthUser,
    kind: AssetKind,
    field_name: &'static str,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>> {
    let mut staged = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some(field_name) {
            staged = Some(stage_upload_field(&state, field).await?);
        }
    }

    let file = staged.ok_or(AppError::MissingAsset(field_name))?;
    let updated = state.accounts.replace_asset(&user.user_id, kind, file).await?;

    Ok(Json(updated.into()))
}
