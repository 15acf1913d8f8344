//! The session authority: owner of the live credential.
//!
//! One explicitly-constructed context object holds the credential, the
//! single refresh timer, and the identity watch channel. The connection
//! layer never touches the credential directly; it reads the identity
//! signal and asks for the current access token at the moment it needs one.
//!
//! Refresh failure is terminal: it is never retried, the credential is
//! cleared, and the published identity drops to `Anonymous`, which forces
//! the connection layer to close and stop reconnecting.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use parley_api::ParleyApi;
use parley_types::{Identity, User};

use crate::credential::Credential;
use crate::error::{AuthError, Result};
use crate::store::SharedCredentialStore;

/// Tunables for the credential lifecycle.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Assumed lifetime of an access token issued by login or refresh.
    /// The endpoints return bare token pairs without an expiry.
    pub token_lifetime: Duration,
    /// How long before expiry the refresh timer fires. An hour-long token
    /// with the default margin refreshes at the 55-minute mark.
    pub refresh_margin: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(3600),
            refresh_margin: Duration::from_secs(300),
        }
    }
}

/// Owns the credential and its refresh timer; publishes identity.
#[derive(Clone)]
pub struct SessionAuthority {
    inner: Arc<Inner>,
}

struct Inner {
    api: ParleyApi,
    store: SharedCredentialStore,
    config: AuthorityConfig,
    state: Mutex<AuthorityState>,
    identity_tx: watch::Sender<Identity>,
}

#[derive(Default)]
struct AuthorityState {
    credential: Option<Credential>,
    refresh_task: Option<JoinHandle<()>>,
    /// Bumped on every install and clear. A refresh timer only acts if the
    /// generation it was scheduled for is still current, so a timer that
    /// outlives its credential can never resurrect a dead session.
    generation: u64,
}

impl SessionAuthority {
    /// Create an authority with default timing.
    pub fn new(api: ParleyApi, store: SharedCredentialStore) -> Self {
        Self::with_config(api, store, AuthorityConfig::default())
    }

    /// Create an authority with explicit timing.
    pub fn with_config(
        api: ParleyApi,
        store: SharedCredentialStore,
        config: AuthorityConfig,
    ) -> Self {
        let (identity_tx, _) = watch::channel(Identity::Anonymous);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                config,
                state: Mutex::new(AuthorityState::default()),
                identity_tx,
            }),
        }
    }

    /// The REST client this authority talks through.
    pub fn api(&self) -> &ParleyApi {
        &self.inner.api
    }

    /// Subscribe to identity changes.
    pub fn identity(&self) -> watch::Receiver<Identity> {
        self.inner.identity_tx.subscribe()
    }

    /// The identity as of now.
    pub fn current_identity(&self) -> Identity {
        self.inner.identity_tx.borrow().clone()
    }

    /// Whether the published identity is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.inner.identity_tx.borrow().is_authenticated()
    }

    /// The current access token, if a credential is installed.
    ///
    /// Callers must read this at the moment they use it, never cache it:
    /// the token rotates underneath long-lived components.
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .credential
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    /// A copy of the current credential, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.inner.state.lock().credential.clone()
    }

    /// Restore a persisted session on process start.
    ///
    /// Loads the stored credential, refreshing it first if the access
    /// token has already expired, then resolves the identity. Any failure
    /// clears the stored state and leaves the session anonymous.
    pub async fn hydrate(&self) -> Result<Option<User>> {
        let Some(stored) = self.inner.store.load().await? else {
            return Ok(None);
        };

        if stored.is_expired() {
            // Access token is gone; the refresh token may still be good.
            match self.inner.api.auth().refresh(&stored.refresh_token).await {
                Ok(tokens) => {
                    let refresh = tokens
                        .refresh
                        .filter(|r| !r.is_empty())
                        .unwrap_or(stored.refresh_token);
                    let credential = Credential::with_lifetime(
                        tokens.access,
                        refresh,
                        self.inner.config.token_lifetime,
                    );
                    self.set_credential(credential).await?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored session expired and refresh failed");
                    if let Err(e) = self.inner.store.clear().await {
                        tracing::warn!(error = %e, "Failed to clear credential store");
                    }
                    return Ok(None);
                }
            }
        } else {
            self.set_credential(stored).await?;
        }

        match self.resolve_identity().await {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(error = %e, "Stored credential rejected");
                Ok(None)
            }
        }
    }

    /// Log in with username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let pair = self.inner.api.auth().login(username, password).await?;
        let credential = Credential::with_lifetime(
            pair.access,
            pair.refresh,
            self.inner.config.token_lifetime,
        );
        self.set_credential(credential).await?;
        self.resolve_identity().await
    }

    /// Register a new account and log it in.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let response = self
            .inner
            .api
            .auth()
            .register(username, email, password)
            .await?;
        let credential = Credential::with_lifetime(
            response.access,
            response.refresh,
            self.inner.config.token_lifetime,
        );
        self.set_credential(credential).await?;
        self.resolve_identity().await
    }

    /// Replace the credential, persist it, and reschedule the refresh
    /// timer. The previous timer is cancelled before the new one exists.
    pub async fn set_credential(&self, credential: Credential) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            self.install_locked(&mut state, credential.clone());
        }
        self.inner.store.save(&credential).await
    }

    /// Refresh the credential now. On success the new credential is
    /// installed and the timer rescheduled; on failure the session is
    /// cleared and the error returned. Never retried.
    pub async fn refresh_now(&self) -> Result<()> {
        let (generation, current) = {
            let state = self.inner.state.lock();
            let credential = state.credential.clone().ok_or(AuthError::NotAuthenticated)?;
            (state.generation, credential)
        };

        match self.inner.api.auth().refresh(&current.refresh_token).await {
            Ok(tokens) => {
                let refresh = tokens
                    .refresh
                    .filter(|r| !r.is_empty())
                    .unwrap_or(current.refresh_token);
                let credential = Credential::with_lifetime(
                    tokens.access,
                    refresh,
                    self.inner.config.token_lifetime,
                );

                {
                    let mut state = self.inner.state.lock();
                    if state.generation != generation {
                        // Logged out while the refresh call was in flight.
                        tracing::debug!("Discarding refresh result for a replaced credential");
                        return Ok(());
                    }
                    self.install_locked(&mut state, credential.clone());
                }
                tracing::info!("Token refreshed");
                self.inner.store.save(&credential).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, clearing session");
                let still_current = self.inner.state.lock().generation == generation;
                if still_current
                    && let Err(clear_err) = self.clear().await
                {
                    tracing::warn!(error = %clear_err, "Failed to clear credential store");
                }
                Err(AuthError::Api(e))
            }
        }
    }

    /// Log out: best-effort server-side invalidation, then local clear.
    pub async fn logout(&self) -> Result<()> {
        if let Some(credential) = self.credential() {
            // Server-side failure must not keep us logged in locally.
            if let Err(e) = self
                .inner
                .api
                .auth()
                .logout(&credential.access_token, &credential.refresh_token)
                .await
            {
                tracing::warn!(error = %e, "Server-side logout failed");
            }
        }
        self.clear().await
    }

    /// Drop the credential: cancel the refresh timer, wipe storage, and
    /// publish `Anonymous`. The timer is dead before this returns.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if let Some(task) = state.refresh_task.take() {
                task.abort();
            }
            state.generation += 1;
            state.credential = None;
        }
        let result = self.inner.store.clear().await;
        self.inner.identity_tx.send_replace(Identity::Anonymous);
        result
    }

    /// Validate the installed credential against the current-user endpoint
    /// and publish the authenticated identity. Clears on rejection.
    async fn resolve_identity(&self) -> Result<User> {
        let token = self.access_token().ok_or(AuthError::NotAuthenticated)?;
        match self.inner.api.auth().current_user(&token).await {
            Ok(user) => {
                self.inner
                    .identity_tx
                    .send_replace(Identity::Authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                if let Err(clear_err) = self.clear().await {
                    tracing::warn!(error = %clear_err, "Failed to clear credential store");
                }
                Err(AuthError::Api(e))
            }
        }
    }

    /// Install a credential and schedule its refresh timer. Caller holds
    /// the state lock.
    fn install_locked(&self, state: &mut AuthorityState, credential: Credential) {
        if let Some(task) = state.refresh_task.take() {
            task.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let wait = credential.time_until_refresh(self.inner.config.refresh_margin);
        state.credential = Some(credential);

        let authority = self.clone();
        state.refresh_task = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // Re-validate at fire time, not schedule time: the credential
            // may have been replaced or cleared during the wait.
            if authority.inner.state.lock().generation != generation {
                tracing::debug!("Refresh timer superseded, ignoring");
                return;
            }
            tracing::info!("Access token nearing expiry, refreshing");
            if let Err(e) = authority.refresh_now().await {
                tracing::warn!(error = %e, "Scheduled refresh failed, session logged out");
            }
        }));
    }
}
