//! # Core Traits (Ports)
//!
//! The Remote Data Service contract. Any backend adapter must implement these
//! traits to be wired into the state containers.
//!
//! Writes and viewer-scoped reads take the `Session` explicitly: the adapter
//! acts with that session's access token, never with ambient global state.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::Result;
use crate::models::{
    AuthEvent, Comment, CommentId, Credentials, ImageUpload, NewComment, NewPost, NewProfile,
    OAuthRedirect, OAuthRequest, Post, PostId, PostPatch, Profile, ProfileUpdate, Session,
    SignUpOutcome, UserId, UserMetadata,
};

/// Row storage for the `posts` collection.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All posts, newest first, each joined with its owner's display fields.
    /// `is_liked` is always `false` here; projecting it is the caller's job.
    async fn list_posts(&self) -> Result<Vec<Post>>;

    /// Inserts a post owned by the session's user and returns the joined row.
    async fn insert_post(&self, session: &Session, post: NewPost) -> Result<Post>;

    async fn update_post(&self, session: &Session, id: PostId, patch: PostPatch) -> Result<Post>;

    async fn delete_post(&self, session: &Session, id: PostId) -> Result<()>;
}

/// The `post_likes` relation: existence of a (post id, user id) pair.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// Ids of every post the session's user has liked.
    async fn liked_post_ids(&self, session: &Session) -> Result<HashSet<PostId>>;

    async fn insert_like(&self, session: &Session, post_id: PostId) -> Result<()>;

    async fn delete_like(&self, session: &Session, post_id: PostId) -> Result<()>;
}

/// Row storage for the `post_comments` collection.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments of exactly one post, oldest first.
    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>>;

    async fn insert_comment(&self, session: &Session, comment: NewComment) -> Result<Comment>;

    async fn update_comment(&self, session: &Session, id: CommentId, content: String) -> Result<Comment>;

    async fn delete_comment(&self, session: &Session, id: CommentId) -> Result<()>;
}

/// Row storage for the `users` (profile) collection.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_profile(&self, session: &Session, id: UserId) -> Result<Option<Profile>>;

    async fn insert_profile(&self, session: &Session, profile: NewProfile) -> Result<Profile>;

    async fn update_profile(&self, session: &Session, id: UserId, update: ProfileUpdate) -> Result<Profile>;
}

/// Object storage for uploaded images.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Stores the blob under `key` (no overwrite) and returns the stored path.
    async fn upload(&self, session: &Session, key: &str, upload: &ImageUpload) -> Result<String>;

    /// Stable public retrieval URL for a stored path.
    fn public_url(&self, path: &str) -> String;
}

/// Identity issuance and the auth change-notification stream.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_up(&self, credentials: &Credentials, metadata: UserMetadata) -> Result<SignUpOutcome>;

    /// Builds the provider redirect for an OAuth sign-in (PKCE).
    fn authorize_url(&self, request: &OAuthRequest) -> Result<OAuthRedirect>;

    /// Completes an OAuth sign-in with the code from the callback URL.
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session>;

    async fn current_session(&self) -> Option<Session>;

    async fn refresh_session(&self) -> Result<Session>;

    /// Ends the current session. Local session state is dropped even when
    /// the remote call fails.
    async fn sign_out(&self) -> Result<()>;

    /// A receiver for every subsequent auth change.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
