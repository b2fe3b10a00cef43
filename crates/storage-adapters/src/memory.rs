//! # In-memory backend
//!
//! A process-local stand-in for the hosted platform, implementing every
//! storage port. It emulates the remote side's triggers (like and comment
//! counters) and row-level ownership rules so the state containers can be
//! exercised end to end without a network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use domains::{
    AuthorSummary, Comment, CommentId, CommentRepository, DomainError, ImageUpload, LikeRepository,
    MediaStorage, NewComment, NewPost, NewProfile, Post, PostId, PostPatch, PostRepository, Profile,
    ProfileRepository, ProfileUpdate, Result, Session, UserId,
};

/// Stored rows carry an insertion sequence so equal timestamps still order
/// deterministically.
#[derive(Debug, Clone)]
struct Stored<T> {
    seq: u64,
    row: T,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    posts: DashMap<PostId, Stored<Post>>,
    comments: DashMap<CommentId, Stored<Comment>>,
    likes: DashSet<(PostId, UserId)>,
    profiles: DashMap<UserId, Profile>,
    objects: DashMap<String, Bytes>,
    bucket: String,
    seq: AtomicU64,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_bucket("post-images")
    }

    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), ..Default::default() }
    }

    /// Number of port calls served so far, successful or not.
    pub fn remote_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// While offline every call fails with `DomainError::Remote`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Remote-side counters, bypassing any client state.
    pub fn post_counts(&self, id: PostId) -> Option<(u32, u32)> {
        self.posts
            .get(&id)
            .map(|p| (p.row.likes_count, p.row.comments_count))
    }

    pub fn has_like(&self, post_id: PostId, user_id: UserId) -> bool {
        self.likes.contains(&(post_id, user_id))
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.objects.get(path).map(|b| b.clone())
    }

    /// Seeds a profile row directly, as if created out of band.
    pub fn seed_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    fn enter(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            tracing::warn!(op, "in-memory backend is offline");
            return Err(DomainError::remote(format!("{op}: backend offline")));
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn author(&self, user_id: UserId) -> Option<AuthorSummary> {
        self.profiles.get(&user_id).map(|p| AuthorSummary {
            username: p.username.clone(),
            full_name: p.full_name.clone(),
            avatar_url: p.avatar_url.clone(),
            email: Some(p.email.clone()),
        })
    }

    fn joined_post(&self, post: &Post) -> Post {
        Post { author: self.author(post.user_id), is_liked: false, ..post.clone() }
    }

    fn joined_comment(&self, comment: &Comment) -> Comment {
        Comment { author: self.author(comment.user_id), ..comment.clone() }
    }

    fn adjust_post<F: FnOnce(&mut Post)>(&self, id: PostId, f: F) {
        if let Some(mut entry) = self.posts.get_mut(&id) {
            f(&mut entry.row);
        }
    }
}

#[async_trait]
impl PostRepository for InMemoryBackend {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        self.enter("list posts")?;
        let mut rows: Vec<(u64, Post)> = self
            .posts
            .iter()
            .map(|e| (e.seq, self.joined_post(&e.row)))
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(rows.into_iter().map(|(_, p)| p).collect())
    }

    async fn insert_post(&self, session: &Session, post: NewPost) -> Result<Post> {
        self.enter("insert post")?;
        let now = Utc::now();
        let row = Post {
            id: PostId::new(),
            user_id: session.user_id(),
            title: post.title,
            summary: post.summary,
            code_content: post.code_content,
            programming_language: post.programming_language,
            tags: post.tags,
            image_url: post.image_url,
            likes_count: 0,
            comments_count: 0,
            created_at: now,
            updated_at: now,
            author: None,
            is_liked: false,
        };
        let joined = self.joined_post(&row);
        self.posts.insert(row.id, Stored { seq: self.next_seq(), row });
        Ok(joined)
    }

    async fn update_post(&self, session: &Session, id: PostId, patch: PostPatch) -> Result<Post> {
        self.enter("update post")?;
        let updated = {
            let mut entry = self
                .posts
                .get_mut(&id)
                .filter(|e| e.row.user_id == session.user_id())
                .ok_or_else(|| DomainError::not_found("Post", id))?;
            let post = &mut entry.row;
            if let Some(title) = patch.title {
                post.title = title;
            }
            if let Some(summary) = patch.summary {
                post.summary = summary;
            }
            if let Some(code) = patch.code_content {
                post.code_content = code;
            }
            if let Some(language) = patch.programming_language {
                post.programming_language = language;
            }
            if let Some(tags) = patch.tags {
                post.tags = tags;
            }
            if let Some(image_url) = patch.image_url {
                post.image_url = image_url;
            }
            post.updated_at = Utc::now();
            post.clone()
        };
        Ok(self.joined_post(&updated))
    }

    async fn delete_post(&self, session: &Session, id: PostId) -> Result<()> {
        self.enter("delete post")?;
        let owner = session.user_id();
        if self.posts.remove_if(&id, |_, e| e.row.user_id == owner).is_some() {
            self.comments.retain(|_, c| c.row.post_id != id);
            self.likes.retain(|(post_id, _)| *post_id != id);
        }
        Ok(())
    }
}

#[async_trait]
impl LikeRepository for InMemoryBackend {
    async fn liked_post_ids(&self, session: &Session) -> Result<HashSet<PostId>> {
        self.enter("list likes")?;
        let user = session.user_id();
        Ok(self
            .likes
            .iter()
            .filter(|k| k.1 == user)
            .map(|k| k.0)
            .collect())
    }

    async fn insert_like(&self, session: &Session, post_id: PostId) -> Result<()> {
        self.enter("insert like")?;
        if !self.posts.contains_key(&post_id) {
            return Err(DomainError::Conflict(format!("insert like: post {post_id} does not exist")));
        }
        if !self.likes.insert((post_id, session.user_id())) {
            return Err(DomainError::Conflict("insert like: duplicate key value".into()));
        }
        self.adjust_post(post_id, |p| p.likes_count += 1);
        Ok(())
    }

    async fn delete_like(&self, session: &Session, post_id: PostId) -> Result<()> {
        self.enter("delete like")?;
        if self.likes.remove(&(post_id, session.user_id())).is_some() {
            self.adjust_post(post_id, |p| p.likes_count = p.likes_count.saturating_sub(1));
        }
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for InMemoryBackend {
    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>> {
        self.enter("list comments")?;
        let mut rows: Vec<(u64, Comment)> = self
            .comments
            .iter()
            .filter(|e| e.row.post_id == post_id)
            .map(|e| (e.seq, self.joined_comment(&e.row)))
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| a.created_at.cmp(&b.created_at).then(sa.cmp(sb)));
        Ok(rows.into_iter().map(|(_, c)| c).collect())
    }

    async fn insert_comment(&self, session: &Session, comment: NewComment) -> Result<Comment> {
        self.enter("insert comment")?;
        if !self.posts.contains_key(&comment.post_id) {
            return Err(DomainError::Conflict(format!(
                "insert comment: post {} does not exist",
                comment.post_id
            )));
        }
        let now = Utc::now();
        let row = Comment {
            id: CommentId::new(),
            post_id: comment.post_id,
            user_id: session.user_id(),
            content: comment.content,
            created_at: now,
            updated_at: now,
            author: None,
        };
        self.adjust_post(row.post_id, |p| p.comments_count += 1);
        let joined = self.joined_comment(&row);
        self.comments.insert(row.id, Stored { seq: self.next_seq(), row });
        Ok(joined)
    }

    async fn update_comment(&self, session: &Session, id: CommentId, content: String) -> Result<Comment> {
        self.enter("update comment")?;
        let updated = {
            let mut entry = self
                .comments
                .get_mut(&id)
                .filter(|e| e.row.user_id == session.user_id())
                .ok_or_else(|| DomainError::not_found("Comment", id))?;
            entry.row.content = content;
            entry.row.updated_at = Utc::now();
            entry.row.clone()
        };
        Ok(self.joined_comment(&updated))
    }

    async fn delete_comment(&self, session: &Session, id: CommentId) -> Result<()> {
        self.enter("delete comment")?;
        let owner = session.user_id();
        if let Some((_, removed)) = self.comments.remove_if(&id, |_, e| e.row.user_id == owner) {
            self.adjust_post(removed.row.post_id, |p| {
                p.comments_count = p.comments_count.saturating_sub(1)
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryBackend {
    async fn find_profile(&self, _session: &Session, id: UserId) -> Result<Option<Profile>> {
        self.enter("find profile")?;
        Ok(self.profiles.get(&id).map(|p| p.clone()))
    }

    async fn insert_profile(&self, _session: &Session, profile: NewProfile) -> Result<Profile> {
        self.enter("insert profile")?;
        let now = Utc::now();
        let row = Profile {
            id: profile.id,
            username: profile.username,
            full_name: profile.full_name,
            avatar_url: profile.avatar_url,
            bio: None,
            email: profile.email,
            created_at: now,
            updated_at: now,
        };
        match self.profiles.entry(row.id) {
            Entry::Occupied(_) => {
                Err(DomainError::Conflict("insert profile: duplicate key value".into()))
            }
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
                Ok(row)
            }
        }
    }

    async fn update_profile(&self, session: &Session, id: UserId, update: ProfileUpdate) -> Result<Profile> {
        self.enter("update profile")?;
        if id != session.user_id() {
            return Err(DomainError::not_found("Profile", id));
        }
        let mut entry = self
            .profiles
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Profile", id))?;
        if let Some(bio) = update.bio {
            entry.bio = Some(bio);
        }
        if let Some(full_name) = update.full_name {
            entry.full_name = Some(full_name);
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[async_trait]
impl MediaStorage for InMemoryBackend {
    async fn upload(&self, _session: &Session, key: &str, upload: &ImageUpload) -> Result<String> {
        self.enter("upload object")?;
        match self.objects.entry(key.to_string()) {
            Entry::Occupied(_) => {
                Err(DomainError::Conflict(format!("upload object: {key} already exists")))
            }
            Entry::Vacant(slot) => {
                slot.insert(upload.bytes.clone());
                Ok(key.to_string())
            }
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{AuthUser, UserMetadata};
    use secrecy::SecretString;

    fn session() -> Session {
        Session {
            user: AuthUser {
                id: UserId::new(),
                email: "dev@example.com".into(),
                user_metadata: UserMetadata::default(),
            },
            access_token: SecretString::from("t"),
            refresh_token: None,
            expires_at: None,
        }
    }

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: title.into(),
            summary: "summary long enough to pass".into(),
            code_content: "void main() {}".into(),
            programming_language: "dart".into(),
            tags: vec![],
            image_url: None,
        }
    }

    #[tokio::test]
    async fn lists_newest_first_even_with_equal_timestamps() {
        let backend = InMemoryBackend::new();
        let s = session();
        for title in ["first", "second", "third"] {
            backend.insert_post(&s, new_post(title)).await.unwrap();
        }
        let titles: Vec<String> = backend
            .list_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, ["third", "second", "first"]);
    }

    #[tokio::test]
    async fn like_triggers_counter_and_rejects_duplicates() {
        let backend = InMemoryBackend::new();
        let s = session();
        let post = backend.insert_post(&s, new_post("p")).await.unwrap();

        backend.insert_like(&s, post.id).await.unwrap();
        assert_eq!(backend.post_counts(post.id), Some((1, 0)));
        assert!(matches!(
            backend.insert_like(&s, post.id).await,
            Err(DomainError::Conflict(_))
        ));

        backend.delete_like(&s, post.id).await.unwrap();
        assert_eq!(backend.post_counts(post.id), Some((0, 0)));
    }

    #[tokio::test]
    async fn only_owner_may_update() {
        let backend = InMemoryBackend::new();
        let owner = session();
        let post = backend.insert_post(&owner, new_post("mine")).await.unwrap();
        let patch = PostPatch { title: Some("theirs".into()), ..Default::default() };
        let err = backend.update_post(&session(), post.id, patch).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(..)));
    }

    #[tokio::test]
    async fn offline_fails_and_counts_calls() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        assert!(backend.list_posts().await.is_err());
        assert_eq!(backend.remote_calls(), 1);
    }
}
