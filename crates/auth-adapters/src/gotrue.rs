//! # GoTrue identity adapter
//!
//! Password sign-in, sign-up, PKCE OAuth and token refresh against the hosted
//! platform's `/auth/v1` API. Holds the current session in memory only; there
//! is no on-disk persistence.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use domains::{
    AuthEvent, AuthEventKind, AuthUser, Credentials, DomainError, IdentityProvider, OAuthRedirect,
    OAuthRequest, Result, Session, SignUpOutcome, UserMetadata,
};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use url::Url;

use crate::hub::SessionHub;
use crate::pkce;

pub struct GoTrueIdentity {
    http: reqwest::Client,
    auth_url: String,
    anon_key: SecretString,
    hub: SessionHub,
}

/// Token grant response shared by the password, refresh and pkce grants.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| self.expires_in.map(|secs| now + chrono::Duration::seconds(secs)));
        Session {
            user: self.user,
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_at,
        }
    }
}

/// With email confirmation on, sign-up answers with the bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// GoTrue has used several error shapes over its versions.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl AuthErrorBody {
    fn message(&self) -> &str {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
            .unwrap_or("unknown error")
    }
}

impl GoTrueIdentity {
    pub fn new(project_url: &str, anon_key: SecretString, timeout: Duration) -> Result<Self> {
        Url::parse(project_url)
            .map_err(|e| DomainError::remote(format!("invalid project url {project_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::remote(e.to_string()))?;
        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", project_url.trim_end_matches('/')),
            anon_key,
            hub: SessionHub::new(),
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/{}", self.auth_url, path))
            .header("apikey", self.anon_key.expose_secret())
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, context, "identity call failed before a response");
            DomainError::remote(e.to_string())
        })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: AuthErrorBody = serde_json::from_str(&text).unwrap_or_default();
            tracing::warn!(%status, context, error_code = ?body.error_code, "identity call rejected");
            return Err(classify(status, &body, context));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| DomainError::remote(format!("{context}: malformed response: {e}")))
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value, context: &str) -> Result<Session> {
        let request = self
            .post("token")
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let token: TokenResponse = self.send(request, context).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Re-reads the user record (metadata may have changed) and publishes
    /// `UserUpdated` with the refreshed identity.
    pub async fn reload_user(&self) -> Result<AuthUser> {
        let mut session = self.hub.current().await.ok_or(DomainError::Unauthenticated)?;
        let request = self
            .http
            .get(format!("{}/user", self.auth_url))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret());
        let user: AuthUser = self.send(request, "get user").await?;
        session.user = user.clone();
        self.hub.publish(AuthEventKind::UserUpdated, Some(session)).await;
        Ok(user)
    }
}

fn classify(status: StatusCode, body: &AuthErrorBody, context: &str) -> DomainError {
    let message = body.message();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DomainError::Unauthenticated,
        StatusCode::CONFLICT => DomainError::Conflict(format!("{context}: {message}")),
        StatusCode::UNPROCESSABLE_ENTITY if body.error_code.as_deref() == Some("user_already_exists") => {
            DomainError::Conflict(format!("{context}: {message}"))
        }
        _ => DomainError::Remote(format!("{context}: {message}")),
    }
}

#[async_trait]
impl IdentityProvider for GoTrueIdentity {
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password.expose_secret(),
        });
        let session = self.token_grant("password", body, "password sign-in").await?;
        tracing::info!(user_id = %session.user_id(), "signed in with password");
        self.hub.publish(AuthEventKind::SignedIn, Some(session.clone())).await;
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials, metadata: UserMetadata) -> Result<SignUpOutcome> {
        let request = self.post("signup").json(&json!({
            "email": credentials.email,
            "password": credentials.password.expose_secret(),
            "data": metadata,
        }));
        match self.send::<SignUpResponse>(request, "sign-up").await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                tracing::info!(user_id = %session.user_id(), "signed up and signed in");
                self.hub.publish(AuthEventKind::SignedUp, Some(session.clone())).await;
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpResponse::User(user) => {
                tracing::info!(user_id = %user.id, "sign-up awaiting email confirmation");
                Ok(SignUpOutcome::ConfirmationSent { email: credentials.email.clone() })
            }
        }
    }

    fn authorize_url(&self, request: &OAuthRequest) -> Result<OAuthRedirect> {
        let verifier = pkce::generate_verifier();
        let mut url = Url::parse(&format!("{}/authorize", self.auth_url))
            .map_err(|e| DomainError::remote(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("provider", &request.provider)
            .append_pair("redirect_to", &request.redirect_to)
            .append_pair("scopes", &request.scopes)
            .append_pair("code_challenge", &pkce::challenge_for(&verifier))
            .append_pair("code_challenge_method", "s256");
        Ok(OAuthRedirect { url: url.into(), code_verifier: SecretString::from(verifier) })
    }

    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session> {
        let body = json!({ "auth_code": auth_code, "code_verifier": code_verifier });
        let session = self.token_grant("pkce", body, "oauth code exchange").await?;
        tracing::info!(user_id = %session.user_id(), "signed in with oauth");
        self.hub.publish(AuthEventKind::SignedIn, Some(session.clone())).await;
        Ok(session)
    }

    async fn current_session(&self) -> Option<Session> {
        self.hub.current().await
    }

    async fn refresh_session(&self) -> Result<Session> {
        let current = self.hub.current().await.ok_or(DomainError::Unauthenticated)?;
        let refresh_token = current.refresh_token.ok_or(DomainError::Unauthenticated)?;
        let body = json!({ "refresh_token": refresh_token.expose_secret() });
        let session = self.token_grant("refresh_token", body, "token refresh").await?;
        tracing::debug!(user_id = %session.user_id(), expires_at = ?session.expires_at, "token refreshed");
        self.hub.publish(AuthEventKind::TokenRefreshed, Some(session.clone())).await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.hub.current().await else {
            return Ok(());
        };
        let result = self
            .post("logout")
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await;
        self.hub.publish(AuthEventKind::SignedOut, None).await;

        match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(DomainError::remote(format!("sign-out: {}", response.status()))),
            Err(e) => Err(DomainError::remote(e.to_string())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.hub.subscribe()
    }
}

impl std::fmt::Debug for GoTrueIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrueIdentity")
            .field("auth_url", &self.auth_url)
            .finish_non_exhaustive()
    }
}
