//! # Session container
//!
//! Mirrors the identity provider's current session into a `watch` channel.
//! Only the standing subscription task and `sign_out` ever write it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domains::{
    Credentials, IdentityProvider, OAuthRedirect, OAuthRequest, Result, Session, SignUpOutcome,
    UserId, UserMetadata,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::state::StateCell;

/// Where and how OAuth sign-in redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub provider: String,
    pub scopes: String,
    pub redirect_url: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            provider: "github".to_string(),
            scopes: "read:user user:email".to_string(),
            redirect_url: "http://localhost:5173/auth/callback".to_string(),
        }
    }
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    state: StateCell<Option<Session>>,
    oauth: OAuthSettings,
    started: AtomicBool,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

/// Keeps the standing subscription alive. Dropping it aborts the task.
#[derive(Debug)]
pub struct SessionSubscription {
    task: Option<JoinHandle<()>>,
    store: Option<SessionStore>,
}

impl SessionSubscription {
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(store) = self.store.take() {
            store.inner.started.store(false, Ordering::SeqCst);
        }
        tracing::debug!("session subscription shut down");
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(store) = self.store.take() {
            store.inner.started.store(false, Ordering::SeqCst);
        }
    }
}

impl SessionStore {
    pub fn new(identity: Arc<dyn IdentityProvider>, oauth: OAuthSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                state: StateCell::new(None),
                oauth,
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.state.snapshot()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.state.read(Option::is_some)
    }

    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.inner.state.subscribe()
    }

    /// Resolves once the subscription task has mirrored a session for
    /// `user_id`. Sign-in returns before that happens, and the other
    /// containers read the mirrored value. `None` after `timeout`.
    pub async fn wait_for_session(&self, user_id: UserId, timeout: Duration) -> Option<Session> {
        let mut rx = self.watch();
        let mirrored = async move {
            rx.wait_for(|s| s.as_ref().is_some_and(|s| s.user_id() == user_id))
                .await
                .ok()
                .and_then(|s| (*s).clone())
        };
        tokio::time::timeout(timeout, mirrored).await.ok().flatten()
    }

    /// Seeds state from the provider and subscribes to its change stream.
    /// A second call while a subscription is live returns an inactive handle.
    pub async fn start(&self) -> SessionSubscription {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("session subscription already started");
            return SessionSubscription { task: None, store: None };
        }

        // Subscribe before reading the current session so nothing in between is missed.
        let events = self.inner.identity.subscribe();
        let initial = self.inner.identity.current_session().await;
        tracing::info!(signed_in = initial.is_some(), "initial session loaded");
        self.inner.state.update(|s| *s = initial);

        let task = tokio::spawn(listen(Arc::clone(&self.inner), events));
        SessionSubscription { task: Some(task), store: Some(self.clone()) }
    }

    /// Fire-and-forget: local state is cleared whatever the provider answers.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Err(e) = self.inner.identity.sign_out().await {
            tracing::warn!(error = %e, "remote sign-out failed; clearing local session anyway");
        }
        self.inner.state.update(|s| *s = None);
        tracing::info!("signed out");
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.inner
            .identity
            .sign_in_with_password(&Credentials::new(email, password))
            .await
    }

    pub async fn sign_up(&self, email: &str, password: &str, metadata: UserMetadata) -> Result<SignUpOutcome> {
        self.inner
            .identity
            .sign_up(&Credentials::new(email, password), metadata)
            .await
    }

    /// OAuth redirect for the configured provider. Keep the returned verifier
    /// for `exchange_code`.
    pub fn github_authorize_url(&self) -> Result<OAuthRedirect> {
        let oauth = &self.inner.oauth;
        self.inner.identity.authorize_url(&OAuthRequest {
            provider: oauth.provider.clone(),
            redirect_to: oauth.redirect_url.clone(),
            scopes: oauth.scopes.clone(),
        })
    }

    pub async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session> {
        self.inner.identity.exchange_code(auth_code, code_verifier).await
    }
}

async fn listen(inner: Arc<Inner>, mut events: broadcast::Receiver<domains::AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!(kind = ?event.kind, signed_in = event.session.is_some(), "auth event");
                inner.state.update(|s| *s = event.session);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "auth events dropped; resyncing session");
                let current = inner.identity.current_session().await;
                inner.state.update(|s| *s = current);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("signed_in", &self.is_signed_in())
            .field("oauth", &self.inner.oauth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{AuthEvent, AuthEventKind, AuthUser, DomainError, MockIdentityProvider, UserId};
    use secrecy::SecretString;

    fn session() -> Session {
        Session {
            user: AuthUser { id: UserId::new(), email: "dev@example.com".into(), user_metadata: Default::default() },
            access_token: SecretString::from("token"),
            refresh_token: None,
            expires_at: None,
        }
    }

    fn identity_with_channel(initial: Option<Session>) -> (MockIdentityProvider, broadcast::Sender<AuthEvent>) {
        let (tx, _) = broadcast::channel(8);
        let mut identity = MockIdentityProvider::new();
        let sub_tx = tx.clone();
        identity.expect_subscribe().returning(move || sub_tx.subscribe());
        identity.expect_current_session().returning(move || initial.clone());
        (identity, tx)
    }

    async fn settle(rx: &mut watch::Receiver<Option<Session>>) {
        let _ = tokio::time::timeout(Duration::from_secs(1), rx.changed()).await;
    }

    #[tokio::test]
    async fn start_seeds_from_provider() {
        let (identity, _tx) = identity_with_channel(Some(session()));
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let sub = store.start().await;
        assert!(store.is_signed_in());
        assert!(sub.is_active());
        sub.shutdown().await;
    }

    #[tokio::test]
    async fn events_replace_session_wholesale() {
        let (identity, tx) = identity_with_channel(None);
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let _sub = store.start().await;
        let mut rx = store.watch();
        rx.borrow_and_update();

        let s = session();
        tx.send(AuthEvent::new(AuthEventKind::SignedIn, Some(s.clone()))).unwrap();
        settle(&mut rx).await;
        assert_eq!(store.current().map(|c| c.user.id), Some(s.user.id));

        tx.send(AuthEvent::new(AuthEventKind::SignedOut, None)).unwrap();
        settle(&mut rx).await;
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn wait_for_session_resolves_once_mirrored() {
        let (identity, tx) = identity_with_channel(None);
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let _sub = store.start().await;
        let s = session();
        let user_id = s.user_id();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for_session(user_id, Duration::from_secs(1)).await })
        };
        tokio::task::yield_now().await;
        assert!(!store.is_signed_in());
        tx.send(AuthEvent::new(AuthEventKind::SignedIn, Some(s))).unwrap();

        let mirrored = waiter.await.unwrap();
        assert_eq!(mirrored.map(|m| m.user_id()), Some(user_id));
        assert!(store.is_signed_in());
    }

    #[tokio::test]
    async fn wait_for_session_ignores_other_users_and_times_out() {
        let (identity, _tx) = identity_with_channel(Some(session()));
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let _sub = store.start().await;
        assert!(store.is_signed_in());

        let waited = store.wait_for_session(UserId::new(), Duration::from_millis(50)).await;
        assert!(waited.is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_even_when_remote_fails() {
        let (mut identity, _tx) = identity_with_channel(Some(session()));
        identity
            .expect_sign_out()
            .times(1)
            .returning(|| Err(DomainError::remote("offline")));
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let _sub = store.start().await;
        assert!(store.is_signed_in());

        store.sign_out().await;
        assert!(!store.is_signed_in());
    }

    #[tokio::test]
    async fn second_start_is_inert() {
        let (identity, _tx) = identity_with_channel(None);
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let first = store.start().await;
        let second = store.start().await;
        assert!(first.is_active());
        assert!(!second.is_active());

        drop(second);
        first.shutdown().await;
        // Restartable after teardown.
        let third = store.start().await;
        assert!(third.is_active());
    }

    #[test]
    fn authorize_url_uses_configured_scopes() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_authorize_url()
            .withf(|req| req.provider == "github" && req.scopes == "read:user user:email")
            .returning(|req| {
                Ok(OAuthRedirect {
                    url: format!("https://auth.example/authorize?redirect_to={}", req.redirect_to),
                    code_verifier: SecretString::from("verifier"),
                })
            });
        let store = SessionStore::new(Arc::new(identity), OAuthSettings::default());
        let redirect = tokio_test::assert_ok!(store.github_authorize_url());
        assert!(redirect.url.ends_with("/auth/callback"));
    }
}
