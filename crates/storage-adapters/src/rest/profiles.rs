use async_trait::async_trait;
use domains::{NewProfile, Profile, ProfileRepository, ProfileUpdate, Result, Session, UserId};
use reqwest::Method;

use super::client::RestClient;
use super::query::Query;
use super::rows::ProfileRow;

const TABLE: &str = "users";

#[derive(Debug, Clone)]
pub struct RestProfileRepository {
    client: RestClient,
}

impl RestProfileRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProfileRepository for RestProfileRepository {
    async fn find_profile(&self, session: &Session, id: UserId) -> Result<Option<Profile>> {
        let query = Query::new().select("*").eq("id", id).limit(1);
        let url = self.client.table_url(TABLE, &query)?;

        let rows: Vec<ProfileRow> = self
            .client
            .send_json(self.client.request(Method::GET, url, Some(session)), "find profile")
            .await?;
        Ok(rows.into_iter().next().map(Profile::from))
    }

    async fn insert_profile(&self, session: &Session, profile: NewProfile) -> Result<Profile> {
        let url = self.client.table_url(TABLE, &Query::new().select("*"))?;
        tracing::debug!(user_id = %profile.id, "inserting profile");

        let request = self
            .client
            .request(Method::POST, url, Some(session))
            .header("Prefer", "return=representation")
            .json(&profile);
        let row: ProfileRow = self
            .client
            .send_single(request, "insert profile", "Profile", &profile.id.to_string())
            .await?;
        Ok(row.into())
    }

    async fn update_profile(&self, session: &Session, id: UserId, update: ProfileUpdate) -> Result<Profile> {
        let query = Query::new().select("*").eq("id", id);
        let url = self.client.table_url(TABLE, &query)?;
        tracing::debug!(user_id = %id, "updating profile");

        let request = self
            .client
            .request(Method::PATCH, url, Some(session))
            .header("Prefer", "return=representation")
            .json(&update);
        let row: ProfileRow = self
            .client
            .send_single(request, "update profile", "Profile", &id.to_string())
            .await?;
        Ok(row.into())
    }
}
