//! Identity-provider collaborator: the contract the session shell
//! consumes, and a Keycloak OIDC implementation of it.

mod pkce;
mod server;
mod storage;

pub mod keycloak;

pub use keycloak::KeycloakAuth;
pub use pkce::PkceCodes;
pub use server::{CallbackResult, CallbackServer};
pub use storage::{TokenSet, TokenStorage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How long the login flow waits for the browser redirect.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300); // 5 minutes

/// Failures while resolving state against the identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("login callback failed: {0}")]
    Callback(String),

    #[error("session expired and no refresh token is stored; run login again")]
    SessionExpired,

    #[error("could not resolve a config directory for credential storage")]
    NoConfigDir,
}

/// Contract the session shell consumes.
///
/// `login`/`logout` are side-effecting and do not alter shell state; a
/// successful login is expected to re-trigger activation externally.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve whether usable credentials exist for the current session.
    async fn is_logged_in(&self) -> Result<bool, AuthError>;

    /// Load the profile of the logged-in user.
    async fn load_user_profile(&self) -> Result<UserProfile, AuthError>;

    /// Run the interactive login flow.
    async fn login(&self) -> Result<(), AuthError>;

    /// Discard the current session.
    async fn logout(&self) -> Result<(), AuthError>;
}

/// OIDC claims subset kept from the `userinfo` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable subject identifier.
    #[serde(default)]
    pub sub: String,
    #[serde(default, rename = "preferred_username")]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "given_name")]
    pub first_name: Option<String>,
    #[serde(default, rename = "family_name")]
    pub last_name: Option<String>,
}
