// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Clipcast: account and session backend for the Clipcast frontend
//!
//! This crate provides the signup saga (staged uploads pushed to
//! Cloudinary, then committed to Firestore) and the rotating
//! access/refresh token session model the frontend logs in with.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::UserStore;
use services::{AccountService, LocalStage, TokenService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub stage: LocalStage,
    pub tokens: TokenService,
    pub accounts: AccountService,
}
