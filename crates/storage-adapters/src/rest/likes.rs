use std::collections::HashSet;

use async_trait::async_trait;
use domains::{LikeRepository, PostId, Result, Session};
use reqwest::Method;
use serde_json::json;

use super::client::RestClient;
use super::query::Query;
use super::rows::LikeRow;

const TABLE: &str = "post_likes";

/// The `post_likes` relation. Like/comment counters on `posts` are kept by
/// remote triggers; this adapter never touches them.
#[derive(Debug, Clone)]
pub struct RestLikeRepository {
    client: RestClient,
}

impl RestLikeRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LikeRepository for RestLikeRepository {
    async fn liked_post_ids(&self, session: &Session) -> Result<HashSet<PostId>> {
        let query = Query::new().select("post_id").eq("user_id", session.user_id());
        let url = self.client.table_url(TABLE, &query)?;

        let rows: Vec<LikeRow> = self
            .client
            .send_json(self.client.request(Method::GET, url, Some(session)), "list likes")
            .await?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    async fn insert_like(&self, session: &Session, post_id: PostId) -> Result<()> {
        let url = self.client.table_url(TABLE, &Query::new())?;
        tracing::debug!(%post_id, user_id = %session.user_id(), "inserting like");

        let request = self
            .client
            .request(Method::POST, url, Some(session))
            .header("Prefer", "return=minimal")
            .json(&json!({ "post_id": post_id, "user_id": session.user_id() }));
        self.client.send(request, "insert like").await?;
        Ok(())
    }

    async fn delete_like(&self, session: &Session, post_id: PostId) -> Result<()> {
        let query = Query::new()
            .eq("post_id", post_id)
            .eq("user_id", session.user_id());
        let url = self.client.table_url(TABLE, &query)?;
        tracing::debug!(%post_id, user_id = %session.user_id(), "deleting like");

        let request = self
            .client
            .request(Method::DELETE, url, Some(session))
            .header("Prefer", "return=minimal");
        self.client.send(request, "delete like").await?;
        Ok(())
    }
}
