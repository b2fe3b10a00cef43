//! # Posts container
//!
//! The feed, the comment thread of the post being viewed, and the
//! engagement counters. Local counters are patched only after the remote
//! write is confirmed; nothing here reconciles them with the server later.

use std::sync::Arc;

use domains::{
    sort_posts, validate_comment, Comment, CommentId, CommentRepository, DomainError, FeedOrder,
    LikeRepository, NewComment, NewPost, NewProfile, Post, PostDraft, PostId, PostPatch, PostRepository,
    ProfileRepository, Result, Session,
};
use tokio::sync::watch;

use crate::state::{user_message, StateCell};

pub const FETCH_POSTS_FAILED: &str = "failed to fetch posts";
pub const CREATE_POST_FAILED: &str = "failed to create post";
pub const UPDATE_POST_FAILED: &str = "failed to update post";
pub const DELETE_POST_FAILED: &str = "failed to delete post";
pub const LIKE_FAILED: &str = "failed to update like";
pub const FETCH_COMMENTS_FAILED: &str = "failed to fetch comments";
pub const CREATE_COMMENT_FAILED: &str = "failed to create comment";
pub const UPDATE_COMMENT_FAILED: &str = "failed to update comment";
pub const DELETE_COMMENT_FAILED: &str = "failed to delete comment";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostsState {
    pub posts: Vec<Post>,
    /// Thread of the most recently fetched post, oldest first.
    pub comments: Vec<Comment>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl PostsState {
    pub fn post(&self, id: PostId) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    fn post_mut(&mut self, id: PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == id)
    }
}

/// Ports the posts container talks to.
#[derive(Clone)]
pub struct PostsPorts {
    pub posts: Arc<dyn PostRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

pub struct PostsStore {
    ports: PostsPorts,
    session: watch::Receiver<Option<Session>>,
    state: StateCell<PostsState>,
}

impl PostsStore {
    pub fn new(ports: PostsPorts, session: watch::Receiver<Option<Session>>) -> Self {
        Self { ports, session, state: StateCell::new(PostsState::default()) }
    }

    pub fn snapshot(&self) -> PostsState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PostsState> {
        self.state.subscribe()
    }

    /// A copy of the feed in the requested order.
    pub fn sorted_posts(&self, order: FeedOrder) -> Vec<Post> {
        let mut posts = self.state.read(|s| s.posts.clone());
        sort_posts(&mut posts, order);
        posts
    }

    pub fn clear_error(&self) {
        self.state.update(|s| s.error = None);
    }

    fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn require_session(&self) -> Result<Session> {
        self.session().ok_or(DomainError::Unauthenticated)
    }

    fn begin_loading(&self) {
        self.state.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    /// Records the error and leaves `is_loading` to whoever set it.
    fn record_failure(&self, context: &str, err: &DomainError) {
        tracing::error!(error = %err, "{context}");
        let message = user_message(context, err);
        self.state.update(|s| s.error = Some(message));
    }

    /// Failure of an operation that called `begin_loading`.
    fn fail_loading(&self, context: &str, err: &DomainError) {
        tracing::error!(error = %err, "{context}");
        let message = user_message(context, err);
        self.state.update(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch_posts(&self) {
        self.begin_loading();
        match self.load_feed().await {
            Ok(posts) => {
                tracing::info!(count = posts.len(), "posts fetched");
                self.state.update(|s| {
                    s.posts = posts;
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(FETCH_POSTS_FAILED, &e),
        }
    }

    async fn load_feed(&self) -> Result<Vec<Post>> {
        let mut posts = self.ports.posts.list_posts().await?;
        if let Some(session) = self.session() {
            let liked = self.ports.likes.liked_post_ids(&session).await?;
            for post in &mut posts {
                post.is_liked = liked.contains(&post.id);
            }
        }
        Ok(posts)
    }

    /// Validates, ensures the author's profile row exists, inserts, and
    /// prepends the new post. Failures are recorded and returned.
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post> {
        let (new_post, session) = match draft.validate().and_then(|p| Ok((p, self.require_session()?))) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.record_failure(CREATE_POST_FAILED, &e);
                return Err(e);
            }
        };
        self.begin_loading();
        let result = self.insert_post(&session, new_post).await;
        match &result {
            Ok(post) => {
                tracing::info!(post_id = %post.id, "post created");
                let post = post.clone();
                self.state.update(|s| {
                    s.posts.insert(0, post);
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(CREATE_POST_FAILED, e),
        }
        result
    }

    async fn insert_post(&self, session: &Session, new_post: NewPost) -> Result<Post> {
        self.ensure_profile(session).await?;
        let mut post = self.ports.posts.insert_post(session, new_post).await?;
        post.is_liked = false;
        Ok(post)
    }

    /// Check-then-insert; a concurrent insert surfaces as `Conflict`, which
    /// means the row now exists.
    async fn ensure_profile(&self, session: &Session) -> Result<()> {
        if self.ports.profiles.find_profile(session, session.user_id()).await?.is_some() {
            return Ok(());
        }
        tracing::info!(user_id = %session.user_id(), "creating missing profile");
        match self.ports.profiles.insert_profile(session, NewProfile::from_session(session)).await {
            Ok(_) | Err(DomainError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_post(&self, id: PostId, patch: PostPatch) {
        let (patch, session) = match patch.validate().and_then(|p| Ok((p, self.require_session()?))) {
            Ok(prepared) => prepared,
            Err(e) => return self.record_failure(UPDATE_POST_FAILED, &e),
        };
        self.begin_loading();

        match self.ports.posts.update_post(&session, id, patch).await {
            Ok(mut updated) => {
                tracing::info!(post_id = %id, "post updated");
                self.state.update(|s| {
                    if let Some(slot) = s.post_mut(id) {
                        updated.is_liked = slot.is_liked;
                        *slot = updated;
                    }
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(UPDATE_POST_FAILED, &e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_post(&self, id: PostId) {
        let session = match self.require_session() {
            Ok(session) => session,
            Err(e) => return self.record_failure(DELETE_POST_FAILED, &e),
        };
        self.begin_loading();

        match self.ports.posts.delete_post(&session, id).await {
            Ok(()) => {
                tracing::info!(post_id = %id, "post deleted");
                self.state.update(|s| {
                    s.posts.retain(|p| p.id != id);
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(DELETE_POST_FAILED, &e),
        }
    }

    /// Likes or unlikes for the current viewer. The local flag and count
    /// change only after the remote write succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_like(&self, id: PostId) {
        let session = match self.require_session() {
            Ok(session) => session,
            Err(e) => return self.record_failure(LIKE_FAILED, &e),
        };
        let Some(was_liked) = self.state.read(|s| s.post(id).map(|p| p.is_liked)) else {
            tracing::debug!(post_id = %id, "like toggle on unknown post ignored");
            return;
        };

        let result = if was_liked {
            self.ports.likes.delete_like(&session, id).await
        } else {
            self.ports.likes.insert_like(&session, id).await
        };

        match result {
            Ok(()) => {
                tracing::info!(post_id = %id, liked = !was_liked, "like toggled");
                self.state.update(|s| {
                    if let Some(post) = s.post_mut(id) {
                        post.is_liked = !was_liked;
                        post.likes_count = if was_liked {
                            post.likes_count.saturating_sub(1)
                        } else {
                            post.likes_count.saturating_add(1)
                        };
                    }
                });
            }
            Err(e) => self.record_failure(LIKE_FAILED, &e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch_comments(&self, post_id: PostId) {
        self.begin_loading();
        match self.ports.comments.list_comments(post_id).await {
            Ok(comments) => {
                tracing::info!(count = comments.len(), "comments fetched");
                self.state.update(|s| {
                    s.comments = comments;
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(FETCH_COMMENTS_FAILED, &e),
        }
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn create_comment(&self, post_id: PostId, content: &str) {
        let result = async {
            let content = validate_comment(content)?;
            let session = self.require_session()?;
            let comment = NewComment { post_id, user_id: session.user_id(), content };
            self.ports.comments.insert_comment(&session, comment).await
        }
        .await;

        match result {
            Ok(comment) => {
                tracing::info!(comment_id = %comment.id, "comment created");
                self.state.update(|s| {
                    s.comments.push(comment);
                    if let Some(post) = s.post_mut(post_id) {
                        post.comments_count = post.comments_count.saturating_add(1);
                    }
                });
            }
            Err(e) => self.record_failure(CREATE_COMMENT_FAILED, &e),
        }
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn update_comment(&self, id: CommentId, content: &str) {
        let result = async {
            let content = validate_comment(content)?;
            let session = self.require_session()?;
            self.ports.comments.update_comment(&session, id, content).await
        }
        .await;

        match result {
            Ok(updated) => {
                tracing::info!(comment_id = %id, "comment updated");
                self.state.update(|s| {
                    if let Some(slot) = s.comments.iter_mut().find(|c| c.id == id) {
                        *slot = updated;
                    }
                });
            }
            Err(e) => self.record_failure(UPDATE_COMMENT_FAILED, &e),
        }
    }

    /// Removes a comment from the loaded thread. The count is decremented on
    /// the comment's own post, whichever post is currently on screen.
    #[tracing::instrument(skip(self))]
    pub async fn delete_comment(&self, id: CommentId) {
        let Some(post_id) = self.state.read(|s| s.comments.iter().find(|c| c.id == id).map(|c| c.post_id)) else {
            tracing::debug!(comment_id = %id, "delete of unloaded comment ignored");
            return;
        };

        let result = async {
            let session = self.require_session()?;
            self.ports.comments.delete_comment(&session, id).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(comment_id = %id, %post_id, "comment deleted");
                self.state.update(|s| {
                    s.comments.retain(|c| c.id != id);
                    if let Some(post) = s.post_mut(post_id) {
                        post.comments_count = post.comments_count.saturating_sub(1);
                    }
                });
            }
            Err(e) => self.record_failure(DELETE_COMMENT_FAILED, &e),
        }
    }
}

impl std::fmt::Debug for PostsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostsStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domains::{
        AuthUser, MockCommentRepository, MockLikeRepository, MockPostRepository, MockProfileRepository,
        Profile, UserId,
    };
    use mockall::predicate::eq;
    use secrecy::SecretString;
    use std::collections::HashSet;

    fn session() -> Session {
        Session {
            user: AuthUser { id: UserId::new(), email: "dev@example.com".into(), user_metadata: Default::default() },
            access_token: SecretString::from("token"),
            refresh_token: None,
            expires_at: None,
        }
    }

    fn post(likes: u32, comments: u32, age_mins: i64) -> Post {
        let at = Utc::now() - Duration::minutes(age_mins);
        Post {
            id: PostId::new(),
            user_id: UserId::new(),
            title: "Animated Button Demo".into(),
            summary: "A button that bounces when pressed.".into(),
            code_content: "fn main() {}".into(),
            programming_language: "rust".into(),
            tags: vec![],
            image_url: None,
            likes_count: likes,
            comments_count: comments,
            created_at: at,
            updated_at: at,
            author: None,
            is_liked: false,
        }
    }

    fn comment(post_id: PostId) -> Comment {
        Comment {
            id: CommentId::new(),
            post_id,
            user_id: UserId::new(),
            content: "nice".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author: None,
        }
    }

    struct Mocks {
        posts: MockPostRepository,
        likes: MockLikeRepository,
        comments: MockCommentRepository,
        profiles: MockProfileRepository,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                posts: MockPostRepository::new(),
                likes: MockLikeRepository::new(),
                comments: MockCommentRepository::new(),
                profiles: MockProfileRepository::new(),
            }
        }

        fn store(self, session: Option<Session>) -> (PostsStore, watch::Sender<Option<Session>>) {
            let (tx, rx) = watch::channel(session);
            let ports = PostsPorts {
                posts: Arc::new(self.posts),
                likes: Arc::new(self.likes),
                comments: Arc::new(self.comments),
                profiles: Arc::new(self.profiles),
            };
            (PostsStore::new(ports, rx), tx)
        }
    }

    fn draft() -> PostDraft {
        PostDraft::new(
            "Animated Button Demo",
            "A button that bounces when it is pressed",
            "Widget build() => Bounce();",
        )
        .with_tags(["widget", "animation"])
    }

    #[tokio::test]
    async fn fetch_projects_liked_flags() {
        let a = post(1, 0, 10);
        let b = post(0, 0, 20);
        let liked: HashSet<PostId> = [a.id].into_iter().collect();

        let mut mocks = Mocks::new();
        let rows = vec![a.clone(), b.clone()];
        mocks.posts.expect_list_posts().times(1).returning(move || Ok(rows.clone()));
        mocks.likes.expect_liked_post_ids().times(1).returning(move |_| Ok(liked.clone()));
        let (store, _tx) = mocks.store(Some(session()));

        store.fetch_posts().await;
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert!(state.post(a.id).unwrap().is_liked);
        assert!(!state.post(b.id).unwrap().is_liked);
    }

    #[tokio::test]
    async fn anonymous_fetch_skips_like_query() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_list_posts().returning(|| Ok(vec![post(0, 0, 1)]));
        mocks.likes.expect_liked_post_ids().never();
        let (store, _tx) = mocks.store(None);

        store.fetch_posts().await;
        assert_eq!(store.snapshot().posts.len(), 1);
    }

    #[tokio::test]
    async fn failed_like_query_keeps_previous_list() {
        let first = post(0, 0, 5);
        let mut mocks = Mocks::new();
        let rows = vec![first.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        let mut calls = 0;
        mocks.likes.expect_liked_post_ids().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(HashSet::new())
            } else {
                Err(DomainError::remote("timeout"))
            }
        });
        let (store, _tx) = mocks.store(Some(session()));

        store.fetch_posts().await;
        store.fetch_posts().await;
        let state = store.snapshot();
        assert_eq!(state.posts, vec![first]);
        assert_eq!(state.error.as_deref(), Some(FETCH_POSTS_FAILED));
    }

    #[tokio::test]
    async fn create_without_session_never_calls_remote() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_insert_post().never();
        mocks.profiles.expect_find_profile().never();
        let (store, _tx) = mocks.store(None);

        let err = store.create_post(draft()).await.unwrap_err();
        assert_eq!(err, DomainError::Unauthenticated);
        assert!(store.snapshot().error.is_some());
    }

    #[tokio::test]
    async fn short_fields_are_rejected_before_remote() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_insert_post().never();
        let (store, _tx) = mocks.store(Some(session()));

        let err = store.create_post(PostDraft::new("Hey", "too short", "x = 1")).await.unwrap_err();
        match err {
            DomainError::Validation(fields) => {
                assert!(fields.contains("title"));
                assert!(fields.contains("summary"));
                assert!(fields.contains("code_content"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_inserts_missing_profile_then_prepends() {
        let s = session();
        let existing = post(3, 1, 60);
        let mut mocks = Mocks::new();
        let rows = vec![existing.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        mocks.likes.expect_liked_post_ids().returning(|_| Ok(HashSet::new()));
        mocks
            .profiles
            .expect_find_profile()
            .with(mockall::predicate::always(), eq(s.user_id()))
            .times(1)
            .returning(|_, _| Ok(None));
        mocks.profiles.expect_insert_profile().times(1).returning(|_, p| {
            Ok(Profile {
                id: p.id,
                username: p.username,
                full_name: p.full_name,
                avatar_url: p.avatar_url,
                bio: None,
                email: p.email,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        });
        let author = s.user_id();
        mocks.posts.expect_insert_post().times(1).returning(move |_, new| {
            let mut row = post(0, 0, 0);
            row.user_id = author;
            row.title = new.title;
            row.tags = new.tags;
            Ok(row)
        });
        let (store, _tx) = mocks.store(Some(s));

        store.fetch_posts().await;
        let created = store.create_post(draft()).await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.posts[0].id, created.id);
        assert_eq!(state.posts[0].likes_count, 0);
        assert_eq!(state.posts[0].comments_count, 0);
        assert!(!state.posts[0].is_liked);
        assert_eq!(state.posts[0].tags, vec!["widget", "animation"]);
        assert_eq!(state.posts[1].id, existing.id);
    }

    #[tokio::test]
    async fn profile_insert_race_is_tolerated() {
        let mut mocks = Mocks::new();
        mocks.profiles.expect_find_profile().returning(|_, _| Ok(None));
        mocks
            .profiles
            .expect_insert_profile()
            .returning(|_, _| Err(DomainError::Conflict("duplicate key".into())));
        mocks.posts.expect_insert_post().times(1).returning(|_, _| Ok(post(0, 0, 0)));
        let (store, _tx) = mocks.store(Some(session()));

        assert!(store.create_post(draft()).await.is_ok());
    }

    #[tokio::test]
    async fn toggle_like_round_trip() {
        let p = post(4, 0, 5);
        let id = p.id;
        let mut mocks = Mocks::new();
        let rows = vec![p.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        mocks.likes.expect_liked_post_ids().returning(|_| Ok(HashSet::new()));
        mocks.likes.expect_insert_like().with(mockall::predicate::always(), eq(id)).times(1).returning(|_, _| Ok(()));
        mocks.likes.expect_delete_like().with(mockall::predicate::always(), eq(id)).times(1).returning(|_, _| Ok(()));
        let (store, _tx) = mocks.store(Some(session()));
        store.fetch_posts().await;

        store.toggle_like(id).await;
        let liked = store.snapshot().post(id).cloned().unwrap();
        assert!(liked.is_liked);
        assert_eq!(liked.likes_count, 5);

        store.toggle_like(id).await;
        let back = store.snapshot().post(id).cloned().unwrap();
        assert!(!back.is_liked);
        assert_eq!(back.likes_count, 4);
    }

    #[tokio::test]
    async fn failed_like_leaves_counts() {
        let p = post(2, 0, 5);
        let id = p.id;
        let mut mocks = Mocks::new();
        let rows = vec![p.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        mocks.likes.expect_liked_post_ids().returning(|_| Ok(HashSet::new()));
        mocks.likes.expect_insert_like().returning(|_, _| Err(DomainError::remote("500")));
        let (store, _tx) = mocks.store(Some(session()));
        store.fetch_posts().await;

        store.toggle_like(id).await;
        let state = store.snapshot();
        assert_eq!(state.post(id).unwrap().likes_count, 2);
        assert!(!state.post(id).unwrap().is_liked);
        assert_eq!(state.error.as_deref(), Some(LIKE_FAILED));
    }

    #[tokio::test]
    async fn failures_outside_a_load_leave_the_loading_flag() {
        let p = post(2, 0, 5);
        let id = p.id;
        let mut mocks = Mocks::new();
        let rows = vec![p.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        mocks.likes.expect_liked_post_ids().returning(|_| Ok(HashSet::new()));
        mocks.likes.expect_insert_like().returning(|_, _| Err(DomainError::remote("500")));
        mocks.comments.expect_insert_comment().returning(|_, _| Err(DomainError::remote("500")));
        mocks.posts.expect_update_post().never();
        let (store, _tx) = mocks.store(Some(session()));
        store.fetch_posts().await;
        // A fetch is still in flight elsewhere.
        store.state.update(|s| s.is_loading = true);

        store.toggle_like(id).await;
        assert!(store.snapshot().is_loading);
        assert_eq!(store.snapshot().error.as_deref(), Some(LIKE_FAILED));

        store.create_comment(id, "nice one").await;
        assert!(store.snapshot().is_loading);
        assert_eq!(store.snapshot().error.as_deref(), Some(CREATE_COMMENT_FAILED));

        store.update_post(id, PostPatch { title: Some("abc".into()), ..Default::default() }).await;
        let state = store.snapshot();
        assert!(state.is_loading);
        assert!(state.error.unwrap().contains("title"));
    }

    #[tokio::test]
    async fn failed_load_clears_the_loading_flag() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_list_posts().returning(|| Err(DomainError::remote("503")));
        let (store, _tx) = mocks.store(None);

        store.fetch_posts().await;
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some(FETCH_POSTS_FAILED));
    }

    #[tokio::test]
    async fn toggle_unknown_post_is_noop() {
        let mut mocks = Mocks::new();
        mocks.likes.expect_insert_like().never();
        mocks.likes.expect_delete_like().never();
        let (store, _tx) = mocks.store(Some(session()));
        store.toggle_like(PostId::new()).await;
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn comment_delete_decrements_its_own_post() {
        let a = post(0, 2, 5);
        let b = post(0, 0, 6);
        let c = comment(a.id);
        let cid = c.id;

        let mut mocks = Mocks::new();
        let rows = vec![a.clone(), b.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        let thread = vec![c.clone()];
        mocks.comments.expect_list_comments().with(eq(a.id)).returning(move |_| Ok(thread.clone()));
        mocks.comments.expect_delete_comment().with(mockall::predicate::always(), eq(cid)).times(1).returning(|_, _| Ok(()));
        let (store, tx) = mocks.store(None);
        store.fetch_posts().await;
        store.fetch_comments(a.id).await;
        tx.send_replace(Some(session()));

        store.delete_comment(cid).await;
        let state = store.snapshot();
        assert!(state.comments.is_empty());
        assert_eq!(state.post(a.id).unwrap().comments_count, 1);
        assert_eq!(state.post(b.id).unwrap().comments_count, 0);
    }

    #[tokio::test]
    async fn delete_of_unloaded_comment_is_noop() {
        let mut mocks = Mocks::new();
        mocks.comments.expect_delete_comment().never();
        let (store, _tx) = mocks.store(Some(session()));
        store.delete_comment(CommentId::new()).await;
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn blank_comment_is_rejected() {
        let mut mocks = Mocks::new();
        mocks.comments.expect_insert_comment().never();
        let (store, _tx) = mocks.store(Some(session()));
        store.create_comment(PostId::new(), "   ").await;
        assert!(store.snapshot().error.unwrap().contains("comment is required"));
    }

    #[tokio::test]
    async fn create_comment_trims_and_bumps_count() {
        let p = post(0, 0, 5);
        let pid = p.id;
        let mut mocks = Mocks::new();
        let rows = vec![p.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        mocks.likes.expect_liked_post_ids().returning(|_| Ok(HashSet::new()));
        mocks
            .comments
            .expect_insert_comment()
            .withf(|_, c| c.content == "great snippet")
            .returning(|_, c| {
                let mut row = comment(c.post_id);
                row.content = c.content;
                Ok(row)
            });
        let (store, _tx) = mocks.store(Some(session()));
        store.fetch_posts().await;

        store.create_comment(pid, "  great snippet \n").await;
        let state = store.snapshot();
        assert_eq!(state.comments.len(), 1);
        assert_eq!(state.post(pid).unwrap().comments_count, 1);
    }

    #[tokio::test]
    async fn update_keeps_like_flag() {
        let mut p = post(1, 0, 5);
        p.is_liked = true;
        let id = p.id;
        let mut mocks = Mocks::new();
        let rows = vec![p.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        let liked: HashSet<PostId> = [id].into_iter().collect();
        mocks.likes.expect_liked_post_ids().returning(move |_| Ok(liked.clone()));
        let base = p.clone();
        mocks.posts.expect_update_post().times(1).returning(move |_, _, patch| {
            let mut row = base.clone();
            row.is_liked = false;
            row.title = patch.title.unwrap_or(row.title);
            Ok(row)
        });
        let (store, _tx) = mocks.store(Some(session()));
        store.fetch_posts().await;

        store
            .update_post(id, PostPatch { title: Some("Renamed snippet".into()), ..Default::default() })
            .await;
        let updated = store.snapshot().post(id).cloned().unwrap();
        assert_eq!(updated.title, "Renamed snippet");
        assert!(updated.is_liked);
    }

    #[tokio::test]
    async fn popular_order_is_by_engagement() {
        let quiet = post(0, 0, 1);
        let busy = post(3, 4, 50);
        let mut mocks = Mocks::new();
        let rows = vec![quiet.clone(), busy.clone()];
        mocks.posts.expect_list_posts().returning(move || Ok(rows.clone()));
        let (store, _tx) = mocks.store(None);
        store.fetch_posts().await;

        let popular = store.sorted_posts(FeedOrder::Popular);
        assert_eq!(popular[0].id, busy.id);
        let recent = store.sorted_posts(FeedOrder::Recent);
        assert_eq!(recent[0].id, quiet.id);
    }

    #[tokio::test]
    async fn clear_error_resets() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_list_posts().returning(|| Err(DomainError::remote("down")));
        let (store, _tx) = mocks.store(None);
        store.fetch_posts().await;
        assert!(store.snapshot().error.is_some());
        store.clear_error();
        assert!(store.snapshot().error.is_none());
    }
}
