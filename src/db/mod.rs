//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreUsers;

use crate::error::AppError;
use crate::models::{RemoteAsset, User};
use async_trait::async_trait;

/// Persistence operations for user accounts.
///
/// Implemented by [`FirestoreUsers`] in production; tests substitute an
/// in-memory store. Reads return `Ok(None)` for absent records rather than
/// a not-found error.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Insert a new user. Fails `DuplicateIdentity` if the email or username
    /// is already taken.
    async fn create(&self, user: &User) -> Result<(), AppError>;

    /// Update display name and email. An email change re-reserves the
    /// identity and fails `DuplicateIdentity` if the new address is taken.
    /// Returns the updated record.
    async fn update_profile(
        &self,
        id: &str,
        fullname: &str,
        email: &str,
    ) -> Result<User, AppError>;

    /// Overwrite the persisted refresh-token slot (last writer wins).
    /// A missing user is treated as a successful no-op so logout stays
    /// idempotent.
    async fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), AppError>;

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError>;

    /// Replace the avatar or cover slot according to `asset.kind`.
    /// Returns the updated record.
    async fn set_asset(&self, id: &str, asset: &RemoteAsset) -> Result<User, AppError>;

    /// Remove the user record and its identity reservations. Used to unwind
    /// a partially committed registration; absent records are a no-op.
    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Insert-only reservation docs that make email/username unique.
    pub const IDENTITIES: &str = "identities";
}
