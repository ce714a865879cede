// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: register, login, logout, refresh.
//!
//! Login and refresh return both tokens in the JSON body and as HttpOnly
//! cookies, so browser and API clients share the endpoints. Registration
//! mints nothing; a fresh account logs in afterwards.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::models::{NewAccount, UserResponse};
use crate::routes::{stage_upload_field, MAX_UPLOAD_BYTES};
use crate::services::passwords;
use crate::services::stage::StagedFile;
use crate::services::tokens::TokenPair;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Session routes that require no authentication.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/auth/register",
            post(register).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

/// Session routes behind the access-token middleware.
/// The middleware is applied in routes/mod.rs.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/logout", post(logout))
}

// ─── Registration ────────────────────────────────────────────

/// Create an account from a multipart form: text fields plus an `avatar`
/// file (required) and a `cover` file (optional).
async fn register(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let mut fullname = None;
    let mut email = None;
    let mut username = None;
    let mut password = None;
    let mut avatar: Option<StagedFile> = None;
    let mut cover: Option<StagedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "fullname" => fullname = Some(read_text(field).await?),
            "email" => email = Some(read_text(field).await?),
            "username" => username = Some(read_text(field).await?),
            "password" => password = Some(read_text(field).await?),
            "avatar" => avatar = Some(stage_upload_field(&state, field).await?),
            "cover" => cover = Some(stage_upload_field(&state, field).await?),
            _ => {}
        }
    }

    // Absent text fields become empty strings and fail validation inside
    // the saga with a field-specific message.
    let fields = NewAccount {
        fullname: fullname.unwrap_or_default(),
        email: email.unwrap_or_default(),
        username: username.unwrap_or_default(),
        password: password.unwrap_or_default(),
    };

    let user = state.accounts.create_account(fields, avatar, cover).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart field: {}", e)))
}

// ─── Login / Logout ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    password: String,
}

/// Login response: the session tokens also travel as cookies.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

/// Authenticate by email or username and mint a session.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let user = match (&payload.email, &payload.username) {
        (Some(email), _) => state.users.find_by_email(email).await?,
        (None, Some(username)) => state.users.find_by_username(username).await?,
        (None, None) => {
            return Err(AppError::Validation(
                "email or username is required".to_string(),
            ))
        }
    };

    // Unknown identity and wrong password fail identically.
    let Some(user) = user else {
        return Err(AppError::InvalidCredentials);
    };

    let password_ok =
        passwords::verify_password_async(payload.password, user.password_hash.clone()).await?;
    if !password_ok {
        return Err(AppError::InvalidCredentials);
    }

    let pair = state.tokens.mint(&user.id).await?;
    let jar = add_session_cookies(jar, &state.config, &pair);

    tracing::info!(user_id = %user.id, "Login");

    Ok((
        jar,
        Json(SessionResponse {
            user: user.into(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

/// Revoke the refresh slot and drop both cookies. Idempotent.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    state.tokens.revoke(&user.user_id).await?;
    let jar = remove_session_cookies(jar, &state.config);

    tracing::info!(user_id = %user.user_id, "Logout");

    Ok((jar, StatusCode::NO_CONTENT))
}

// ─── Refresh ─────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Rotate the session: the presented refresh token is retired and a fresh
/// pair is issued.
///
/// The token comes from the refresh cookie when present, else from the
/// JSON body for non-browser clients.
async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<RefreshResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token));

    let Some(token) = presented else {
        return Err(AppError::TokenInvalid);
    };

    let pair = state.tokens.verify_refresh_and_rotate(&token).await?;
    let jar = add_session_cookies(jar, &state.config, &pair);

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

// ─── Cookies ─────────────────────────────────────────────────

/// Sessions ride plain HTTP only against a local frontend.
fn secure_cookies(config: &Config) -> bool {
    config.frontend_url.starts_with("https://")
}

fn session_cookie(
    name: &'static str,
    value: String,
    max_age_secs: i64,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie.set_max_age(time::Duration::seconds(max_age_secs));
    cookie
}

fn add_session_cookies(jar: CookieJar, config: &Config, pair: &TokenPair) -> CookieJar {
    let secure = secure_cookies(config);
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        config.access_ttl_secs(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        config.refresh_ttl_secs(),
        secure,
    ))
}

/// Removal cookies must carry the same attributes they were set with, or
/// browsers keep the originals.
fn remove_session_cookies(jar: CookieJar, config: &Config) -> CookieJar {
    let secure = secure_cookies(config);
    jar.add(session_cookie(ACCESS_COOKIE, String::new(), 0, secure))
        .add(session_cookie(REFRESH_COOKIE, String::new(), 0, secure))
}
