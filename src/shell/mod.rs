//! Session shell: startup sequencing and sync lifecycle.
//!
//! On activation the shell resolves login state against the identity
//! provider. When logged in it loads the user profile, then fires two
//! independent remote syncs against the backend: create a fixed user
//! record, and fetch user 1 into the local record. The syncs are
//! fire-and-forget and order-independent; their outcomes land on the
//! event channel and in the log, never in the shell's control flow.

mod subscription;

pub use subscription::{Subscription, SubscriptionSet};

use crate::auth::{IdentityProvider, UserProfile};
use crate::client::{ApiClient, TransportError};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Local user record. Starts empty; overwritten by a successful fetch
/// sync. The remote store owns identity — nothing is enforced locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
}

/// Activation lifecycle. The terminal state is reached once per
/// activation; there is no re-entry without a new shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Uninitialized,
    ResolvingAuth,
    Anonymous,
    Authenticated,
}

/// Outcome of one fire-and-forget sync operation.
#[derive(Debug)]
pub enum SyncEvent {
    /// Backend acknowledged the create; body kept for diagnostics only.
    CreateCompleted(serde_json::Value),
    CreateFailed(TransportError),
    /// The fetched record has been written into the local user record.
    FetchCompleted(User),
    /// Fetch failed; the local record is left unchanged.
    FetchFailed(TransportError),
}

pub struct SessionShell {
    auth: Arc<dyn IdentityProvider>,
    client: Arc<ApiClient>,
    state: ShellState,
    profile: Option<UserProfile>,
    user: Arc<Mutex<User>>,
    subscriptions: SubscriptionSet,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl SessionShell {
    /// Build a shell plus the receiving end of its sync-outcome channel.
    pub fn new(
        auth: Arc<dyn IdentityProvider>,
        client: Arc<ApiClient>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, outcomes) = mpsc::unbounded_channel();

        let shell = Self {
            auth,
            client,
            state: ShellState::Uninitialized,
            profile: None,
            user: Arc::new(Mutex::new(User::default())),
            subscriptions: SubscriptionSet::default(),
            events,
        };

        (shell, outcomes)
    }

    /// Run the activation sequence once.
    ///
    /// Resolves login state; when logged in, loads the profile and then
    /// fires the create and fetch syncs without awaiting either. Auth
    /// failures propagate; sync failures never do. Calling again after
    /// a terminal state was reached returns that state unchanged.
    pub async fn activate(&mut self) -> Result<ShellState> {
        if self.state != ShellState::Uninitialized {
            return Ok(self.state);
        }
        self.state = ShellState::ResolvingAuth;

        let logged_in = self.auth.is_logged_in().await?;
        if !logged_in {
            self.state = ShellState::Anonymous;
            debug!("activation finished anonymous");
            return Ok(self.state);
        }
        self.state = ShellState::Authenticated;

        let profile = self.auth.load_user_profile().await?;
        debug!(subject = %profile.sub, "user profile loaded");
        self.profile = Some(profile);

        self.create_user_sync();
        self.fetch_user_sync();

        Ok(self.state)
    }

    /// POST the fixed record to the remote store. The response body is
    /// only reported, never applied to the local record.
    fn create_user_sync(&mut self) {
        let record = User {
            username: "henry".to_string(),
            email: "henry@example.com".to_string(),
        };

        let client = Arc::clone(&self.client);
        let request =
            async move { client.create::<User, serde_json::Value>("/api/users", &record).await };

        let completed = self.events.clone();
        let failed = self.events.clone();
        self.subscriptions.track(Subscription::spawn(
            request,
            move |body: serde_json::Value| {
                debug!(%body, "create-user sync acknowledged");
                let _ = completed.send(SyncEvent::CreateCompleted(body));
            },
            move |err: TransportError| {
                error!(error = %err, "create-user sync failed");
                let _ = failed.send(SyncEvent::CreateFailed(err));
            },
        ));
    }

    /// GET user 1 and overwrite the local record's fields on success.
    fn fetch_user_sync(&mut self) {
        let client = Arc::clone(&self.client);
        let request = async move { client.fetch::<User>("/api/users/1").await };

        let user = Arc::clone(&self.user);
        let completed = self.events.clone();
        let failed = self.events.clone();
        self.subscriptions.track(Subscription::spawn(
            request,
            move |fetched: User| {
                if let Ok(mut record) = user.lock() {
                    record.username = fetched.username.clone();
                    record.email = fetched.email.clone();
                }
                let _ = completed.send(SyncEvent::FetchCompleted(fetched));
            },
            move |err: TransportError| {
                error!(error = %err, "fetch-user sync failed; local record unchanged");
                let _ = failed.send(SyncEvent::FetchFailed(err));
            },
        ));
    }

    /// Delegate to the identity provider. A successful login is expected
    /// to re-trigger activation externally; shell state is not altered.
    pub async fn login(&self) -> Result<()> {
        Ok(self.auth.login().await?)
    }

    /// Delegate to the identity provider; shell state is not altered.
    pub async fn logout(&self) -> Result<()> {
        Ok(self.auth.logout().await?)
    }

    /// Dispose every tracked subscription, suppressing late deliveries.
    /// Safe to call repeatedly and when nothing was ever subscribed.
    pub fn deactivate(&mut self) {
        self.subscriptions.dispose_all();
    }

    #[must_use]
    pub fn state(&self) -> ShellState {
        self.state
    }

    #[must_use]
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Snapshot of the local user record.
    #[must_use]
    pub fn user(&self) -> User {
        self.user
            .lock()
            .map(|record| record.clone())
            .unwrap_or_default()
    }
}

impl Drop for SessionShell {
    fn drop(&mut self) {
        self.subscriptions.dispose_all();
    }
}
