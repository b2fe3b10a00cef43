//! Process-local identity provider. Accounts live in a `DashMap` keyed by
//! lowercase email; tokens are random and never validated by anyone but us.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use domains::{
    AuthEvent, AuthEventKind, AuthUser, Credentials, DomainError, IdentityProvider, OAuthRedirect,
    OAuthRequest, Result, Session, SignUpOutcome, UserId, UserMetadata,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::hub::SessionHub;
use crate::pkce;

/// Lifetime of issued access tokens.
pub const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password: SecretString,
    confirmed: bool,
}

#[derive(Debug, Clone)]
struct PendingCode {
    email: String,
    challenge: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: DashMap<String, Account>,
    codes: DashMap<String, PendingCode>,
    refresh_tokens: DashMap<String, String>,
    require_confirmation: bool,
    refreshes: AtomicUsize,
}

/// Cloning shares the account table and the session slot.
#[derive(Debug, Clone)]
pub struct InMemoryIdentity {
    inner: Arc<Inner>,
    hub: Arc<SessionHub>,
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner::default()), hub: Arc::new(SessionHub::new()) }
    }

    /// Sign-ups wait for `confirm_email` before they can sign in.
    pub fn with_email_confirmation() -> Self {
        let inner = Inner { require_confirmation: true, ..Inner::default() };
        Self { inner: Arc::new(inner), hub: Arc::new(SessionHub::new()) }
    }

    /// Registers a confirmed account without touching the current session.
    pub fn register(&self, email: &str, password: &str, metadata: UserMetadata) -> AuthUser {
        let user = AuthUser { id: UserId::new(), email: email.to_string(), user_metadata: metadata };
        self.inner.accounts.insert(
            key(email),
            Account { user: user.clone(), password: SecretString::from(password.to_string()), confirmed: true },
        );
        user
    }

    pub fn confirm_email(&self, email: &str) -> Result<()> {
        let mut account = self
            .inner
            .accounts
            .get_mut(&key(email))
            .ok_or_else(|| DomainError::not_found("user", email))?;
        account.confirmed = true;
        Ok(())
    }

    /// Plays the provider's part of an OAuth round trip: given the redirect
    /// built by `authorize_url`, returns the code the callback would carry.
    /// The account is created on first use, like a provider sign-in.
    pub fn issue_oauth_code(&self, redirect: &OAuthRedirect, email: &str, metadata: UserMetadata) -> Result<String> {
        let challenge = url_param(&redirect.url, "code_challenge")
            .ok_or_else(|| DomainError::remote("authorize url has no code_challenge"))?;
        self.inner.accounts.entry(key(email)).or_insert_with(|| Account {
            user: AuthUser { id: UserId::new(), email: email.to_string(), user_metadata: metadata },
            password: SecretString::from(Uuid::new_v4().simple().to_string()),
            confirmed: true,
        });
        let code = Uuid::new_v4().simple().to_string();
        self.inner.codes.insert(code.clone(), PendingCode { email: key(email), challenge });
        Ok(code)
    }

    /// Number of successful refresh grants so far.
    pub fn refresh_count(&self) -> usize {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    /// Replaces the current session's expiry, so refresh timing can be tested.
    pub async fn expire_current_at(&self, expires_at: chrono::DateTime<Utc>) -> Result<()> {
        let mut session = self.hub.current().await.ok_or(DomainError::Unauthenticated)?;
        session.expires_at = Some(expires_at);
        self.hub.publish(AuthEventKind::TokenRefreshed, Some(session)).await;
        Ok(())
    }

    fn issue_session(&self, user: AuthUser) -> Session {
        let refresh = Uuid::new_v4().simple().to_string();
        self.inner.refresh_tokens.insert(refresh.clone(), key(&user.email));
        Session {
            user,
            access_token: SecretString::from(Uuid::new_v4().simple().to_string()),
            refresh_token: Some(SecretString::from(refresh)),
            expires_at: Some(Utc::now() + Duration::seconds(TOKEN_TTL_SECS)),
        }
    }
}

fn key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn url_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session> {
        let account = self
            .inner
            .accounts
            .get(&key(&credentials.email))
            .map(|a| a.value().clone())
            .filter(|a| a.password.expose_secret() == credentials.password.expose_secret())
            .ok_or_else(|| DomainError::remote("Invalid login credentials"))?;
        if !account.confirmed {
            return Err(DomainError::remote("Email not confirmed"));
        }
        let session = self.issue_session(account.user);
        self.hub.publish(AuthEventKind::SignedIn, Some(session.clone())).await;
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials, metadata: UserMetadata) -> Result<SignUpOutcome> {
        if credentials.password.expose_secret().len() < 6 {
            return Err(DomainError::remote("Password should be at least 6 characters"));
        }
        let email = key(&credentials.email);
        if self.inner.accounts.contains_key(&email) {
            return Err(DomainError::Conflict("User already registered".into()));
        }
        let user = AuthUser { id: UserId::new(), email: credentials.email.trim().to_string(), user_metadata: metadata };
        let confirmed = !self.inner.require_confirmation;
        self.inner.accounts.insert(
            email,
            Account { user: user.clone(), password: credentials.password.clone(), confirmed },
        );
        if !confirmed {
            return Ok(SignUpOutcome::ConfirmationSent { email: user.email });
        }
        let session = self.issue_session(user);
        self.hub.publish(AuthEventKind::SignedUp, Some(session.clone())).await;
        Ok(SignUpOutcome::SignedIn(session))
    }

    fn authorize_url(&self, request: &OAuthRequest) -> Result<OAuthRedirect> {
        let verifier = pkce::generate_verifier();
        let url = format!(
            "memory://authorize?provider={}&code_challenge={}&code_challenge_method=s256",
            request.provider,
            pkce::challenge_for(&verifier),
        );
        Ok(OAuthRedirect { url, code_verifier: SecretString::from(verifier) })
    }

    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session> {
        let (_, pending) = self
            .inner
            .codes
            .remove(auth_code)
            .ok_or_else(|| DomainError::remote("invalid flow state, no valid flow state found"))?;
        if pkce::challenge_for(code_verifier) != pending.challenge {
            return Err(DomainError::remote("code challenge does not match previously saved code verifier"));
        }
        let user = self
            .inner
            .accounts
            .get(&pending.email)
            .map(|a| a.user.clone())
            .ok_or_else(|| DomainError::not_found("user", &pending.email))?;
        let session = self.issue_session(user);
        self.hub.publish(AuthEventKind::SignedIn, Some(session.clone())).await;
        Ok(session)
    }

    async fn current_session(&self) -> Option<Session> {
        self.hub.current().await
    }

    async fn refresh_session(&self) -> Result<Session> {
        let current = self.hub.current().await.ok_or(DomainError::Unauthenticated)?;
        let token = current.refresh_token.ok_or(DomainError::Unauthenticated)?;
        let (_, email) = self
            .inner
            .refresh_tokens
            .remove(token.expose_secret())
            .ok_or(DomainError::Unauthenticated)?;
        let user = self
            .inner
            .accounts
            .get(&email)
            .map(|a| a.user.clone())
            .ok_or(DomainError::Unauthenticated)?;
        let session = self.issue_session(user);
        self.inner.refreshes.fetch_add(1, Ordering::SeqCst);
        self.hub.publish(AuthEventKind::TokenRefreshed, Some(session.clone())).await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.hub.current().await {
            if let Some(token) = session.refresh_token {
                self.inner.refresh_tokens.remove(token.expose_secret());
            }
            self.hub.publish(AuthEventKind::SignedOut, None).await;
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("dev@example.com", "hunter22")
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let identity = InMemoryIdentity::new();
        let outcome = identity.sign_up(&creds(), UserMetadata::default()).await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::SignedIn(_)));

        identity.sign_out().await.unwrap();
        assert!(identity.current_session().await.is_none());

        let session = identity.sign_in_with_password(&creds()).await.unwrap();
        assert_eq!(session.user.email, "dev@example.com");
        assert!(identity.current_session().await.is_some());
    }

    #[tokio::test]
    async fn duplicate_sign_up_conflicts() {
        let identity = InMemoryIdentity::new();
        identity.sign_up(&creds(), UserMetadata::default()).await.unwrap();
        let err = identity
            .sign_up(&Credentials::new("DEV@example.com", "other-pass"), UserMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn confirmation_gates_sign_in() {
        let identity = InMemoryIdentity::with_email_confirmation();
        let outcome = identity.sign_up(&creds(), UserMetadata::default()).await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationSent { .. }));
        assert!(identity.sign_in_with_password(&creds()).await.is_err());

        identity.confirm_email("dev@example.com").unwrap();
        assert!(identity.sign_in_with_password(&creds()).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let identity = InMemoryIdentity::new();
        identity.register("dev@example.com", "hunter22", UserMetadata::default());
        let err = identity
            .sign_in_with_password(&Credentials::new("dev@example.com", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Remote(_)));
        assert!(identity.current_session().await.is_none());
    }

    #[tokio::test]
    async fn oauth_code_requires_matching_verifier() {
        let identity = InMemoryIdentity::new();
        let request = OAuthRequest {
            provider: "github".into(),
            redirect_to: "http://localhost/callback".into(),
            scopes: "read:user".into(),
        };
        let redirect = identity.authorize_url(&request).unwrap();
        let code = identity
            .issue_oauth_code(&redirect, "octo@example.com", UserMetadata::default())
            .unwrap();

        assert!(identity.exchange_code(&code, "wrong-verifier").await.is_err());

        // The failed attempt consumed the code.
        let code = identity
            .issue_oauth_code(&redirect, "octo@example.com", UserMetadata::default())
            .unwrap();
        let session = identity
            .exchange_code(&code, redirect.code_verifier.expose_secret())
            .await
            .unwrap();
        assert_eq!(session.user.email, "octo@example.com");
    }

    #[tokio::test]
    async fn refresh_rotates_tokens_and_notifies() {
        let identity = InMemoryIdentity::new();
        identity.register("dev@example.com", "hunter22", UserMetadata::default());
        let first = identity.sign_in_with_password(&creds()).await.unwrap();
        let mut events = identity.subscribe();

        let second = identity.refresh_session().await.unwrap();
        assert_ne!(
            first.access_token.expose_secret(),
            second.access_token.expose_secret()
        );
        assert_eq!(identity.refresh_count(), 1);
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::TokenRefreshed);
    }

    #[tokio::test]
    async fn sign_out_without_session_is_quiet() {
        let identity = InMemoryIdentity::new();
        let mut events = identity.subscribe();
        identity.sign_out().await.unwrap();
        assert!(events.try_recv().is_err());
    }
}
