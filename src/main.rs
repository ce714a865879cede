// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clipcast API Server
//!
//! Serves account signup (with avatar/cover uploads pushed to Cloudinary)
//! and cookie-based sessions with rotating refresh tokens, backed by
//! Firestore.

use clipcast::{
    config::Config,
    db::{FirestoreUsers, UserStore},
    services::{AccountService, AssetStore, CloudinaryStore, LocalStage, TokenService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Clipcast API");

    // Initialize Firestore-backed user store
    let users: Arc<dyn UserStore> = Arc::new(
        FirestoreUsers::new(&config.gcp_project_id)
            .await
            .expect("Failed to connect to Firestore"),
    );

    // Initialize Cloudinary client
    let assets: Arc<dyn AssetStore> = Arc::new(
        CloudinaryStore::new(&config).expect("Failed to initialize Cloudinary client"),
    );
    tracing::info!(
        cloud = %config.cloudinary_cloud_name,
        "Cloudinary client initialized"
    );

    // Local staging area for uploads; clear out anything a crashed
    // instance left behind.
    let stage = LocalStage::new(&config.upload_dir);
    if let Err(e) = stage.sweep(std::time::Duration::from_secs(3600)).await {
        tracing::warn!(error = %e, "Stage sweep failed");
    }

    let tokens = TokenService::new(&config, users.clone())
        .expect("Failed to initialize token service");

    let accounts = AccountService::new(users.clone(), assets, stage.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        users,
        stage,
        tokens,
        accounts,
    });

    // Build router
    let app = clipcast::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clipcast=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
