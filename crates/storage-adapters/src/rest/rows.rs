//! Wire rows as PostgREST returns them, and their conversion into domain models.
//!
//! Joined owner fields arrive under the `users` key; nullable columns and
//! counters are tolerated here so the domain types can stay strict.

use chrono::{DateTime, Utc};
use domains::{AuthorSummary, Comment, CommentId, Post, PostId, Profile, UserId, DEFAULT_LANGUAGE};
use serde::Deserialize;

pub(crate) const AUTHOR_COLUMNS: &str = "username,full_name,avatar_url,email";

pub(crate) fn post_select() -> String {
    format!("*,users!posts_user_id_fkey({AUTHOR_COLUMNS})")
}

pub(crate) fn comment_select() -> String {
    format!("*,users!post_comments_user_id_fkey({AUTHOR_COLUMNS})")
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostRow {
    id: PostId,
    user_id: UserId,
    title: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    code_content: Option<String>,
    #[serde(default)]
    programming_language: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    likes_count: Option<i64>,
    #[serde(default)]
    comments_count: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    users: Option<AuthorSummary>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            summary: row.summary.unwrap_or_default(),
            code_content: row.code_content.unwrap_or_default(),
            programming_language: row
                .programming_language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            tags: row.tags.unwrap_or_default(),
            image_url: row.image_url,
            likes_count: counter(row.likes_count),
            comments_count: counter(row.comments_count),
            created_at: row.created_at,
            updated_at: row.updated_at,
            author: row.users,
            is_liked: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentRow {
    id: CommentId,
    post_id: PostId,
    user_id: UserId,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    users: Option<AuthorSummary>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
            author: row.users,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileRow {
    id: UserId,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            avatar_url: row.avatar_url,
            bio: row.bio,
            email: row.email.unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LikeRow {
    pub(crate) post_id: PostId,
}

/// Counters are maintained remotely by triggers; anything negative or
/// missing is read as zero.
fn counter(raw: Option<i64>) -> u32 {
    let value = raw.unwrap_or(0);
    if value < 0 {
        tracing::warn!(value, "negative counter from remote; clamping to zero");
    }
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joined_post_row_converts() {
        let row: PostRow = serde_json::from_value(json!({
            "id": "5b0c5d3e-8a6b-4f39-9a43-0d5b0f1f6a01",
            "user_id": "0e7f6f1c-2f43-4d6b-8d0c-3b8c0d0c3c11",
            "title": "Animated Button Demo",
            "summary": "A button that bounces when tapped.",
            "code_content": "class Bouncy {}",
            "programming_language": "dart",
            "tags": ["widget", "animation"],
            "image_url": null,
            "likes_count": 3,
            "comments_count": -1,
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:00:00+00:00",
            "users": { "username": "octocat", "full_name": null, "avatar_url": null, "email": "o@example.com" }
        }))
        .unwrap();
        let post = Post::from(row);
        assert_eq!(post.likes_count, 3);
        assert_eq!(post.comments_count, 0);
        assert!(!post.is_liked);
        assert_eq!(post.author.unwrap().username.as_deref(), Some("octocat"));
    }

    #[test]
    fn sparse_post_row_gets_defaults() {
        let row: PostRow = serde_json::from_value(json!({
            "id": "5b0c5d3e-8a6b-4f39-9a43-0d5b0f1f6a01",
            "user_id": "0e7f6f1c-2f43-4d6b-8d0c-3b8c0d0c3c11",
            "title": "t",
            "tags": null,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        let post = Post::from(row);
        assert!(post.tags.is_empty());
        assert_eq!(post.programming_language, DEFAULT_LANGUAGE);
        assert!(post.author.is_none());
    }

    #[test]
    fn selects_embed_owner_join() {
        assert_eq!(post_select(), "*,users!posts_user_id_fkey(username,full_name,avatar_url,email)");
        assert!(comment_select().starts_with("*,users!post_comments_user_id_fkey("));
    }
}
