use async_trait::async_trait;
use domains::{Comment, CommentId, CommentRepository, NewComment, PostId, Result, Session};
use reqwest::Method;
use serde_json::json;

use super::client::RestClient;
use super::query::{Direction, Query};
use super::rows::{comment_select, CommentRow};

const TABLE: &str = "post_comments";

#[derive(Debug, Clone)]
pub struct RestCommentRepository {
    client: RestClient,
}

impl RestCommentRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommentRepository for RestCommentRepository {
    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>> {
        let query = Query::new()
            .select(&comment_select())
            .eq("post_id", post_id)
            .order("created_at", Direction::Asc);
        let url = self.client.table_url(TABLE, &query)?;
        tracing::debug!(%post_id, "listing comments");

        let rows: Vec<CommentRow> = self
            .client
            .send_json(self.client.request(Method::GET, url, None), "list comments")
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn insert_comment(&self, session: &Session, comment: NewComment) -> Result<Comment> {
        let url = self
            .client
            .table_url(TABLE, &Query::new().select(&comment_select()))?;
        tracing::debug!(post_id = %comment.post_id, "inserting comment");

        let request = self
            .client
            .request(Method::POST, url, Some(session))
            .header("Prefer", "return=representation")
            .json(&comment);
        let row: CommentRow = self
            .client
            .send_single(request, "insert comment", "Comment", "new")
            .await?;
        Ok(row.into())
    }

    async fn update_comment(&self, session: &Session, id: CommentId, content: String) -> Result<Comment> {
        let query = Query::new().select(&comment_select()).eq("id", id);
        let url = self.client.table_url(TABLE, &query)?;
        tracing::debug!(comment_id = %id, "updating comment");

        let request = self
            .client
            .request(Method::PATCH, url, Some(session))
            .header("Prefer", "return=representation")
            .json(&json!({ "content": content }));
        let row: CommentRow = self
            .client
            .send_single(request, "update comment", "Comment", &id.to_string())
            .await?;
        Ok(row.into())
    }

    async fn delete_comment(&self, session: &Session, id: CommentId) -> Result<()> {
        let url = self.client.table_url(TABLE, &Query::new().eq("id", id))?;
        tracing::debug!(comment_id = %id, "deleting comment");

        let request = self
            .client
            .request(Method::DELETE, url, Some(session))
            .header("Prefer", "return=minimal");
        self.client.send(request, "delete comment").await?;
        Ok(())
    }
}
