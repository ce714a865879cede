//! User model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Which profile slot a remote asset fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Avatar,
    Cover,
}

impl AssetKind {
    /// Stable lowercase name, used in object-store folders and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Avatar => "avatar",
            AssetKind::Cover => "cover",
        }
    }
}

/// An uploaded asset living in the remote object store.
///
/// `public_id` is the handle the store needs for deletes; `url` is the
/// public delivery URL. The kind tag travels with the asset so rollback
/// code never has to know which slot an asset was uploaded for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub kind: AssetKind,
    pub public_id: String,
    pub url: String,
}

/// User account stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque hex ID (also used as document ID)
    pub id: String,
    /// Email address (stored lowercased)
    pub email: String,
    /// Username (stored lowercased)
    pub username: String,
    /// Display name
    pub fullname: String,
    /// Encoded password hash (scheme, iterations, salt and digest in one string)
    pub password_hash: String,
    /// Avatar image (required at registration)
    pub avatar: RemoteAsset,
    /// Cover image (optional)
    pub cover: Option<RemoteAsset>,
    /// The single currently-valid refresh token, or None when logged out.
    /// Overwritten on every mint; this field alone decides refresh validity.
    pub refresh_token: Option<String>,
    /// When the account was created
    pub created_at: String,
    /// Last profile or credential update
    pub updated_at: String,
}

/// Validated registration fields (multipart text parts).
///
/// Every field must be present and non-empty; the max bounds are hygiene
/// against oversized form values, not a password policy.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(length(min = 1, max = 100, message = "fullname must be 1-100 characters"))]
    pub fullname: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, max = 30, message = "username must be 1-30 characters"))]
    pub username: String,
    #[validate(length(min = 1, max = 128, message = "password must be 1-128 characters"))]
    pub password: String,
}

/// User as returned by the API. Never includes credential fields.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub fullname: String,
    pub avatar_url: String,
    pub cover_url: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            fullname: user.fullname,
            avatar_url: user.avatar.url,
            cover_url: user.cover.map(|c| c.url),
            created_at: user.created_at,
        }
    }
}
