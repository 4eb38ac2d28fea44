use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin of the user backend, e.g. `http://localhost:8081`.
    pub base_origin: String,
    /// Identity provider settings.
    pub keycloak: KeycloakConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeycloakConfig {
    /// Keycloak server URL, e.g. `http://localhost:8080`.
    pub server_url: String,
    /// Realm the application's users live in.
    pub realm: String,
    /// Public OIDC client id registered for this application.
    pub client_id: String,
    /// Loopback port the login flow listens on for the code redirect.
    /// Must match the redirect URI registered with the realm client.
    pub redirect_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_origin: "http://localhost:8081".to_string(),
            keycloak: KeycloakConfig::default(),
        }
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            realm: "usersync".to_string(),
            client_id: "usersync-app".to_string(),
            redirect_port: 8415,
        }
    }
}

impl Config {
    /// Path of the config file.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("usersync").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".usersync/config.toml"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_origin, "http://localhost:8081");
        assert_eq!(config.keycloak.server_url, "http://localhost:8080");
        assert_eq!(config.keycloak.realm, "usersync");
        assert_eq!(config.keycloak.redirect_port, 8415);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            base_origin = "http://10.0.0.5:9000"

            [keycloak]
            realm = "production"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_origin, "http://10.0.0.5:9000");
        assert_eq!(config.keycloak.realm, "production");
        // Unspecified keys keep their defaults.
        assert_eq!(config.keycloak.client_id, "usersync-app");
        assert_eq!(config.keycloak.redirect_port, 8415);
    }
}
