//! Explicit wiring of the containers.

use std::sync::Arc;

use domains::{
    CommentRepository, IdentityProvider, LikeRepository, MediaStorage, PostRepository, ProfileRepository,
    IMAGE_MAX_BYTES,
};

use crate::posts::{PostsPorts, PostsStore};
use crate::profile::ProfileStore;
use crate::session::{OAuthSettings, SessionStore};
use crate::uploads::ImageUploader;

/// One implementation of every port.
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityProvider>,
    pub posts: Arc<dyn PostRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub media: Arc<dyn MediaStorage>,
}

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub oauth: OAuthSettings,
    pub max_upload_bytes: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { oauth: OAuthSettings::default(), max_upload_bytes: IMAGE_MAX_BYTES }
    }
}

/// Every state container, sharing one session. Pass it by reference to
/// whatever renders or drives the app.
#[derive(Debug)]
pub struct AppContext {
    pub session: SessionStore,
    pub posts: PostsStore,
    pub profile: ProfileStore,
    pub uploads: ImageUploader,
}

impl AppContext {
    pub fn new(backend: Backend, options: ContextOptions) -> Self {
        let session = SessionStore::new(backend.identity, options.oauth);
        let posts = PostsStore::new(
            PostsPorts {
                posts: backend.posts,
                likes: backend.likes,
                comments: backend.comments,
                profiles: Arc::clone(&backend.profiles),
            },
            session.watch(),
        );
        let profile = ProfileStore::new(backend.profiles, session.watch());
        let uploads = ImageUploader::new(backend.media, session.watch(), options.max_upload_bytes);
        Self { session, posts, profile, uploads }
    }
}
