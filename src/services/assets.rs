// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloudinary client for remote asset storage.
//!
//! Handles:
//! - Signed uploads from the local stage
//! - Signed destroys for saga compensation
//! - Bounded request timeouts (a timeout is an upload/delete failure)

use crate::config::Config;
use crate::error::AppError;
use crate::models::{AssetKind, RemoteAsset};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// Remote object store for user-visible assets.
///
/// Deletes are issued for compensation, so an asset that is already gone
/// counts as deleted.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload a staged file, returning the remote handle and delivery URL.
    async fn upload(&self, kind: AssetKind, local_path: &Path) -> Result<RemoteAsset, AppError>;

    /// Remove an uploaded asset by its remote handle.
    async fn delete(&self, public_id: &str) -> Result<(), AppError>;
}

/// Cloudinary upload API client.
#[derive(Clone)]
pub struct CloudinaryStore {
    http: reqwest::Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

/// Successful upload response (fields we use).
#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

/// Destroy response; `result` is "ok" or "not found".
#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStore {
    /// Create a new Cloudinary client with credentials and timeout from config.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.asset_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
            cloud_name: config.cloudinary_cloud_name.clone(),
            api_key: config.cloudinary_api_key.clone(),
            api_secret: config.cloudinary_api_secret.clone(),
        })
    }

    /// Cloudinary request signature: signed params sorted by key, joined as
    /// `k=v&k=v`, secret appended, SHA-256, hex.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
        sorted.sort();

        let payload = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check response status and parse the JSON body, mapping failures
    /// through the caller's error kind.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        err: fn(String) -> AppError,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(err(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| err(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl AssetStore for CloudinaryStore {
    async fn upload(&self, kind: AssetKind, local_path: &Path) -> Result<RemoteAsset, AppError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| AppError::AssetUpload(format!("Failed to read staged file: {}", e)))?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let folder = format!("clipcast/{}", kind.as_str());
        let signature = self.sign(&[("folder", &folder), ("timestamp", &timestamp)]);

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder)
            .text("signature", signature);

        let url = format!("{}/{}/image/upload", self.base_url, self.cloud_name);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::AssetUpload(e.to_string()))?;

        let uploaded: UploadResponse =
            Self::check_response_json(response, AppError::AssetUpload).await?;

        tracing::info!(
            kind = kind.as_str(),
            public_id = %uploaded.public_id,
            "Asset uploaded"
        );

        Ok(RemoteAsset {
            kind,
            public_id: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let url = format!("{}/{}/image/destroy", self.base_url, self.cloud_name);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::AssetDelete(e.to_string()))?;

        let destroyed: DestroyResponse =
            Self::check_response_json(response, AppError::AssetDelete).await?;

        // "not found" means the asset is already gone, which is what a
        // compensating delete wanted anyway.
        match destroyed.result.as_str() {
            "ok" | "not found" => {
                tracing::info!(public_id, result = %destroyed.result, "Asset deleted");
                Ok(())
            }
            other => Err(AppError::AssetDelete(format!(
                "Destroy returned {:?} for {}",
                other, public_id
            ))),
        }
    }
}
