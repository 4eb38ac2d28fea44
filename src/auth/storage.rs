//! Credential persistence for Keycloak realms.

use super::AuthError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Refresh this far ahead of access-token expiry.
const REFRESH_SKEW_MS: u64 = 5 * 60 * 1000;

/// Tokens issued for one realm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access-token expiry, milliseconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// ID token (OpenID Connect).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenSet {
    /// True when the access token expires within the refresh skew.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        expires_at.saturating_sub(now_ms()) < REFRESH_SKEW_MS
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        now_ms() >= expires_at
    }

    /// Usable: not expired, or a refresh token exists to recover with.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.is_expired() || self.refresh_token.is_some()
    }
}

/// Milliseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)] // ms since epoch won't overflow u64
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Storage file format: one token set per realm.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(flatten)]
    realms: HashMap<String, TokenSet>,
}

/// On-disk credential store.
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    /// Store under the user config directory.
    pub fn new() -> Result<Self, AuthError> {
        let config_dir = dirs::config_dir()
            .ok_or(AuthError::NoConfigDir)?
            .join("usersync");

        fs::create_dir_all(&config_dir)?;

        Ok(Self {
            path: config_dir.join("auth.json"),
        })
    }

    /// Storage rooted at an explicit file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the token set for a realm.
    pub fn load(&self, realm: &str) -> Result<Option<TokenSet>, AuthError> {
        let file = self.read_file()?;
        Ok(file.realms.get(realm).cloned())
    }

    /// Save the token set for a realm.
    pub fn save(&self, realm: &str, tokens: TokenSet) -> Result<(), AuthError> {
        let mut file = self.read_file()?;
        file.realms.insert(realm.to_string(), tokens);
        self.write_file(&file)
    }

    /// Drop the token set for a realm.
    pub fn clear(&self, realm: &str) -> Result<(), AuthError> {
        let mut file = self.read_file()?;
        file.realms.remove(realm);
        self.write_file(&file)
    }

    fn read_file(&self) -> Result<CredentialFile, AuthError> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }

        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_file(&self, file: &CredentialFile) -> Result<(), AuthError> {
        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, content)?;

        // Tokens are secrets: owner-only on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, permissions)?;
        }

        Ok(())
    }
}
