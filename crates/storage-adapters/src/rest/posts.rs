use async_trait::async_trait;
use domains::{NewPost, Post, PostId, PostPatch, PostRepository, Result, Session, UserId};
use reqwest::Method;
use serde::Serialize;

use super::client::RestClient;
use super::query::{Direction, Query};
use super::rows::{post_select, PostRow};

const TABLE: &str = "posts";

/// `posts` over PostgREST, joined with the owner's `users` row.
#[derive(Debug, Clone)]
pub struct RestPostRepository {
    client: RestClient,
}

impl RestPostRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct InsertPost<'a> {
    #[serde(flatten)]
    post: &'a NewPost,
    user_id: UserId,
}

#[async_trait]
impl PostRepository for RestPostRepository {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let query = Query::new()
            .select(&post_select())
            .order("created_at", Direction::Desc);
        let url = self.client.table_url(TABLE, &query)?;
        tracing::debug!(%url, "listing posts");

        let rows: Vec<PostRow> = self
            .client
            .send_json(self.client.request(Method::GET, url, None), "list posts")
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn insert_post(&self, session: &Session, post: NewPost) -> Result<Post> {
        let query = Query::new().select(&post_select());
        let url = self.client.table_url(TABLE, &query)?;
        let body = InsertPost { post: &post, user_id: session.user_id() };
        tracing::debug!(user_id = %session.user_id(), title = %post.title, "inserting post");

        let request = self
            .client
            .request(Method::POST, url, Some(session))
            .header("Prefer", "return=representation")
            .json(&body);
        let row: PostRow = self
            .client
            .send_single(request, "insert post", "Post", "new")
            .await?;
        Ok(row.into())
    }

    async fn update_post(&self, session: &Session, id: PostId, patch: PostPatch) -> Result<Post> {
        let query = Query::new().select(&post_select()).eq("id", id);
        let url = self.client.table_url(TABLE, &query)?;
        tracing::debug!(post_id = %id, "updating post");

        let request = self
            .client
            .request(Method::PATCH, url, Some(session))
            .header("Prefer", "return=representation")
            .json(&patch);
        let row: PostRow = self
            .client
            .send_single(request, "update post", "Post", &id.to_string())
            .await?;
        Ok(row.into())
    }

    async fn delete_post(&self, session: &Session, id: PostId) -> Result<()> {
        let url = self.client.table_url(TABLE, &Query::new().eq("id", id))?;
        tracing::debug!(post_id = %id, "deleting post");

        let request = self
            .client
            .request(Method::DELETE, url, Some(session))
            .header("Prefer", "return=minimal");
        self.client.send(request, "delete post").await?;
        Ok(())
    }
}
