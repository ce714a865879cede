//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory; in production the
//! deployment platform injects them as environment variables.

use std::env;
use std::path::PathBuf;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS and cookie security decisions
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Directory where multipart uploads are staged before the object store
    pub upload_dir: PathBuf,
    /// Cloudinary cloud name (public)
    pub cloudinary_cloud_name: String,
    /// Timeout for object-store HTTP calls, in seconds
    pub asset_timeout_secs: u64,
    /// Access-token lifetime, in minutes
    pub access_token_ttl_minutes: i64,
    /// Refresh-token lifetime, in days
    pub refresh_token_ttl_days: i64,

    // --- Secrets (from env bindings) ---
    /// Cloudinary API key
    pub cloudinary_api_key: String,
    /// Cloudinary API secret used to sign upload/destroy requests
    pub cloudinary_api_secret: String,
    /// Root key for session tokens; signing keys are derived from it (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            upload_dir: PathBuf::from("./tmp/uploads"),
            cloudinary_cloud_name: "test-cloud".to_string(),
            asset_timeout_secs: 30,
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            cloudinary_api_key: "test_api_key".to_string(),
            cloudinary_api_secret: "test_api_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            // Non-sensitive config from env
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./tmp/uploads")),
            cloudinary_cloud_name: env::var("CLOUDINARY_CLOUD_NAME")
                .map_err(|_| ConfigError::Missing("CLOUDINARY_CLOUD_NAME"))?,
            asset_timeout_secs: env::var("ASSET_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            access_token_ttl_minutes: env::var("ACCESS_TOKEN_TTL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            refresh_token_ttl_days: env::var("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),

            // Secrets - injected as env vars by the deployment platform
            cloudinary_api_key: env::var("CLOUDINARY_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("CLOUDINARY_API_KEY"))?,
            cloudinary_api_secret: env::var("CLOUDINARY_API_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("CLOUDINARY_API_SECRET"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Access-token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_token_ttl_minutes * 60
    }

    /// Refresh-token lifetime in seconds.
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_token_ttl_days * 86_400
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
