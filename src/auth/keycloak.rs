//! Keycloak OIDC flows: browser login, token refresh, profile retrieval.
//!
//! The realm client is a public one (PKCE, no client secret), the
//! standard profile for a browser-driven application.

use super::pkce::{PkceCodes, generate_state};
use super::server::CallbackServer;
use super::storage::{TokenSet, TokenStorage, now_ms};
use super::{AuthError, CALLBACK_TIMEOUT, IdentityProvider, UserProfile};
use crate::config::KeycloakConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Scopes requested at login.
const SCOPES: &str = "openid profile email";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    id_token: Option<String>,
}

impl TokenResponse {
    /// Keycloak omits the refresh token on some refresh grants; keep the
    /// one we already hold in that case.
    fn into_token_set(self, prior_refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| prior_refresh.map(str::to_string)),
            expires_at: self.expires_in.map(|secs| now_ms() + secs * 1000),
            id_token: self.id_token,
        }
    }
}

/// Keycloak-backed identity provider.
pub struct KeycloakAuth {
    client: reqwest::Client,
    config: KeycloakConfig,
    storage: TokenStorage,
}

impl KeycloakAuth {
    pub fn new(config: KeycloakConfig) -> Result<Self, AuthError> {
        let storage = TokenStorage::new()?;
        Ok(Self::with_storage(config, storage))
    }

    /// Build against an explicit credential store.
    #[must_use]
    pub fn with_storage(config: KeycloakConfig, storage: TokenStorage) -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            storage,
        }
    }

    fn realm_base(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect",
            self.config.server_url.trim_end_matches('/'),
            self.config.realm
        )
    }

    fn auth_endpoint(&self) -> String {
        format!("{}/auth", self.realm_base())
    }

    fn token_endpoint(&self) -> String {
        format!("{}/token", self.realm_base())
    }

    fn userinfo_endpoint(&self) -> String {
        format!("{}/userinfo", self.realm_base())
    }

    fn build_auth_url(&self, redirect_uri: &str, state: &str, pkce: &PkceCodes) -> String {
        format!(
            "{}?response_type=code\
             &client_id={}\
             &redirect_uri={}\
             &scope={}\
             &state={}\
             &code_challenge={}\
             &code_challenge_method=S256",
            self.auth_endpoint(),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPES),
            state,
            pkce.challenge,
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce: &PkceCodes,
    ) -> Result<TokenSet, AuthError> {
        let response = self
            .client
            .post(self.token_endpoint())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.config.client_id.as_str()),
                ("code_verifier", pkce.verifier.as_str()),
            ])
            .send()
            .await?;

        let tokens = Self::decode_tokens(response).await?;
        Ok(tokens.into_token_set(None))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let response = self
            .client
            .post(self.token_endpoint())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await?;

        let tokens = Self::decode_tokens(response).await?;
        Ok(tokens.into_token_set(Some(refresh_token)))
    }

    async fn decode_tokens(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Valid access token for the realm, refreshing first when stale.
    async fn access_token(&self) -> Result<String, AuthError> {
        let Some(tokens) = self.storage.load(&self.config.realm)? else {
            return Err(AuthError::SessionExpired);
        };

        if !tokens.needs_refresh() {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(AuthError::SessionExpired);
        };

        debug!("access token stale; refreshing");
        let mut refreshed = self.refresh(refresh_token).await?;
        if refreshed.id_token.is_none() {
            refreshed.id_token = tokens.id_token.clone();
        }
        self.storage.save(&self.config.realm, refreshed.clone())?;
        Ok(refreshed.access_token)
    }
}

#[async_trait]
impl IdentityProvider for KeycloakAuth {
    async fn is_logged_in(&self) -> Result<bool, AuthError> {
        Ok(self
            .storage
            .load(&self.config.realm)?
            .is_some_and(|tokens| tokens.is_usable()))
    }

    async fn load_user_profile(&self) -> Result<UserProfile, AuthError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(self.userinfo_endpoint())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn login(&self) -> Result<(), AuthError> {
        let pkce = PkceCodes::generate();
        let state = generate_state();

        let server = CallbackServer::bind(self.config.redirect_port, state.clone())?;
        let redirect_uri = server.redirect_uri();
        let auth_url = self.build_auth_url(&redirect_uri, &state, &pkce);

        println!("Opening browser for Keycloak login...");
        println!("If the browser doesn't open, visit:");
        println!("  {auth_url}");
        println!();
        if let Err(err) = open::that(&auth_url) {
            warn!(error = %err, "could not open browser; visit the URL manually");
        }

        println!("Waiting for login on {redirect_uri}...");
        let callback = server.wait_for_callback(CALLBACK_TIMEOUT)?;

        let tokens = self.exchange_code(&callback.code, &redirect_uri, &pkce).await?;
        self.storage.save(&self.config.realm, tokens)?;
        println!("Login successful.");
        Ok(())
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.storage.clear(&self.config.realm)
    }
}
