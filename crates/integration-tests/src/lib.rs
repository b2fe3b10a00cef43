//! Shared fixtures for the cross-crate tests.

use std::sync::Arc;
use std::time::Duration;

use auth_adapters::InMemoryIdentity;
use chrono::Utc;
use domains::{AuthUser, PostDraft, Session, UserId, UserMetadata};
use secrecy::SecretString;
use serde_json::{json, Value};
use services::{AppContext, Backend, ContextOptions, SessionSubscription};
use storage_adapters::InMemoryBackend;

pub const PASSWORD: &str = "correct-horse";

/// A full context over the in-memory backend, with its subscription running.
pub struct MemoryApp {
    pub ctx: AppContext,
    pub store: Arc<InMemoryBackend>,
    pub identity: InMemoryIdentity,
    pub subscription: SessionSubscription,
}

impl MemoryApp {
    pub async fn start() -> Self {
        let store = Arc::new(InMemoryBackend::new());
        let identity = InMemoryIdentity::new();
        let backend = Backend {
            identity: Arc::new(identity.clone()),
            posts: store.clone(),
            likes: store.clone(),
            comments: store.clone(),
            profiles: store.clone(),
            media: store.clone(),
        };
        let ctx = AppContext::new(backend, ContextOptions::default());
        let subscription = ctx.session.start().await;
        Self { ctx, store, identity, subscription }
    }

    /// Registers (first time only) and signs in, then waits until every
    /// container sees the new session.
    pub async fn sign_in(&self, email: &str, username: &str) -> Session {
        let metadata = UserMetadata {
            user_name: Some(username.to_string()),
            full_name: Some(format!("{username} (full)")),
            ..Default::default()
        };
        let session = match self.ctx.session.sign_in_with_password(email, PASSWORD).await {
            Ok(session) => session,
            Err(_) => {
                self.identity.register(email, PASSWORD, metadata);
                self.ctx
                    .session
                    .sign_in_with_password(email, PASSWORD)
                    .await
                    .expect("sign-in with a registered account")
            }
        };
        self.ctx
            .session
            .wait_for_session(session.user_id(), Duration::from_secs(1))
            .await
            .expect("session never reached the store");
        session
    }

    pub async fn sign_out(&self) {
        self.ctx.session.sign_out().await;
        assert!(wait_for(|| !self.ctx.session.is_signed_in()).await);
    }
}

/// Polls `check` for up to a second.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn valid_draft(title: &str) -> PostDraft {
    PostDraft::new(
        title,
        "A short walkthrough of the snippet and why it works.",
        "fn main() { println!(\"hello\"); }",
    )
    .with_language("rust")
}

/// A session carrying a fixed access token, for HTTP adapter tests.
pub fn session_with_token(token: &str) -> Session {
    Session {
        user: AuthUser {
            id: UserId::new(),
            email: "dev@example.com".into(),
            user_metadata: UserMetadata::default(),
        },
        access_token: SecretString::from(token.to_string()),
        refresh_token: Some(SecretString::from("refresh-1".to_string())),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
    }
}

/// A `posts` row as PostgREST returns it with the owner join.
pub fn post_row(id: uuid::Uuid, user_id: uuid::Uuid, title: &str, likes: i64, comments: i64) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "title": title,
        "summary": "A short walkthrough of the snippet and why it works.",
        "code_content": "fn main() {}",
        "programming_language": "rust",
        "tags": ["cli"],
        "image_url": null,
        "likes_count": likes,
        "comments_count": comments,
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:00Z",
        "users": {
            "username": "octo",
            "full_name": "Octo Cat",
            "avatar_url": null,
            "email": "octo@example.com"
        }
    })
}

/// A GoTrue token grant response.
pub fn token_body(user_id: uuid::Uuid, email: &str, access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": Utc::now().timestamp() + 3600,
        "refresh_token": refresh,
        "user": {
            "id": user_id,
            "email": email,
            "user_metadata": { "user_name": "octo", "avatar_url": "https://avatars.example/octo.png" }
        }
    })
}
