//! Shared HTTP plumbing for the hosted platform's REST surfaces.

use std::time::Duration;

use domains::{DomainError, Result, Session};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::{check_status, transport};
use super::query::Query;

/// Project-scoped client: one base URL, one anon key, one connection pool.
///
/// Cheap to clone; every repository holds its own copy.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
}

impl RestClient {
    pub fn new(base_url: &str, anon_key: SecretString, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| DomainError::remote(format!("invalid project url {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// `{base}/{path}` with `query` applied.
    pub(crate) fn url(&self, path: &str, query: &Query) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| DomainError::remote(format!("bad url {raw}: {e}")))?;
        query.apply(&mut url);
        Ok(url)
    }

    pub(crate) fn table_url(&self, table: &str, query: &Query) -> Result<Url> {
        self.url(&format!("rest/v1/{table}"), query)
    }

    /// Starts a request carrying the project key. With a session the request
    /// acts as that user, otherwise as the anonymous role.
    pub(crate) fn request(&self, method: Method, url: Url, session: Option<&Session>) -> RequestBuilder {
        let bearer = match session {
            Some(s) => s.access_token.expose_secret().to_string(),
            None => self.anon_key.expose_secret().to_string(),
        };
        self.http
            .request(method, url)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    pub(crate) async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response> {
        let response = builder.send().await.map_err(transport)?;
        check_status(response, context).await
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, context: &str) -> Result<T> {
        let response = self.send(builder, context).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DomainError::remote(format!("{context}: malformed response: {e}")))
    }

    /// For `return=representation` writes that answer with a one-row array.
    pub(crate) async fn send_single<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &str,
        entity: &str,
        id: &str,
    ) -> Result<T> {
        let rows: Vec<T> = self.send_json(builder, context).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found(entity, id))
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
