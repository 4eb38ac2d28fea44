//! Command-line surface: login, logout, and the default sync run.

use crate::auth::{IdentityProvider, KeycloakAuth};
use crate::client::ApiClient;
use crate::config::Config;
use crate::shell::{SessionShell, ShellState, SyncEvent};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "usersync",
    about = "Sync a local user record against a Keycloak-protected backend",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Login to the configured Keycloak realm
    Login,
    /// Logout and discard stored credentials
    Logout,
}

fn build_shell(
    config: &Config,
) -> Result<(
    SessionShell,
    tokio::sync::mpsc::UnboundedReceiver<SyncEvent>,
)> {
    let auth: Arc<dyn IdentityProvider> = Arc::new(KeycloakAuth::new(config.keycloak.clone())?);
    let client = Arc::new(ApiClient::new(config.base_origin.clone()));
    Ok(SessionShell::new(auth, client))
}

/// Run the interactive login flow.
pub async fn login(config: &Config) -> Result<()> {
    let (shell, _outcomes) = build_shell(config)?;
    shell.login().await?;
    Ok(())
}

/// Discard the stored session.
pub async fn logout(config: &Config) -> Result<()> {
    let (shell, _outcomes) = build_shell(config)?;
    shell.logout().await?;
    println!("Logged out.");
    Ok(())
}

/// Activate the shell once, wait for both sync outcomes, report the
/// record, and tear down.
pub async fn run(config: &Config) -> Result<()> {
    let (mut shell, mut outcomes) = build_shell(config)?;

    let state = shell.activate().await?;
    if state == ShellState::Anonymous {
        println!("Not logged in. Run `usersync login` first.");
        return Ok(());
    }

    // Two fire-and-forget syncs were started; their completion order is
    // not defined, so wait for both outcomes.
    for _ in 0..2 {
        match outcomes.recv().await {
            Some(SyncEvent::CreateCompleted(body)) => info!(%body, "create acknowledged"),
            Some(SyncEvent::CreateFailed(err)) => info!(error = %err, "create failed"),
            Some(SyncEvent::FetchCompleted(_)) => info!("fetch applied"),
            Some(SyncEvent::FetchFailed(err)) => info!(error = %err, "fetch failed"),
            None => break,
        }
    }

    if let Some(profile) = shell.profile() {
        println!(
            "profile: sub={} username={}",
            profile.sub,
            profile.username.as_deref().unwrap_or("-")
        );
    }
    let record = shell.user();
    println!(
        "user record: username={} email={}",
        record.username, record.email
    );

    shell.deactivate();
    Ok(())
}
