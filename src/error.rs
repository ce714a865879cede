// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Token-verification failures stay distinct variants internally (and in
//! logs) but collapse to a single 401 body on the wire, so callers cannot
//! probe which check rejected a credential.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Missing asset: {0}")]
    MissingAsset(&'static str),

    #[error("Email or username already in use")]
    DuplicateIdentity,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token signature or format invalid")]
    TokenInvalid,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Asset upload failed: {0}")]
    AssetUpload(String),

    #[error("Asset delete failed: {0}")]
    AssetDelete(String),

    #[error("Account creation failed: {0}")]
    AccountCreation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::MissingAsset(what) => (
                StatusCode::BAD_REQUEST,
                "missing_asset",
                Some((*what).to_string()),
            ),
            AppError::DuplicateIdentity => (StatusCode::CONFLICT, "duplicate_identity", None),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            // Expired, malformed and revoked tokens are deliberately
            // indistinguishable to the caller; the variant is kept in logs.
            AppError::TokenExpired | AppError::TokenInvalid | AppError::TokenRevoked => {
                tracing::debug!(kind = ?self, "Rejected token");
                (StatusCode::UNAUTHORIZED, "invalid_token", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::AssetUpload(msg) => {
                tracing::error!(error = %msg, "Asset upload error");
                (StatusCode::BAD_GATEWAY, "asset_upload_error", None)
            }
            AppError::AssetDelete(msg) => {
                tracing::error!(error = %msg, "Asset delete error");
                (StatusCode::BAD_GATEWAY, "asset_delete_error", None)
            }
            AppError::AccountCreation(msg) => {
                tracing::error!(error = %msg, "Account creation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "account_creation_failed",
                    None,
                )
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
