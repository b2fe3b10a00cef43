//! Object storage bucket implementation of `MediaStorage`.

use async_trait::async_trait;
use domains::{ImageUpload, MediaStorage, Result, Session};
use reqwest::Method;
use serde::Deserialize;

use super::client::RestClient;
use super::query::Query;

/// Browser/CDN cache lifetime for uploaded images, in seconds.
const CACHE_MAX_AGE_SECS: u32 = 3600;

#[derive(Debug, Clone)]
pub struct BucketStorage {
    client: RestClient,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

impl BucketStorage {
    pub fn new(client: RestClient, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl MediaStorage for BucketStorage {
    /// Uploads without upsert: an existing object under `key` is a conflict.
    async fn upload(&self, session: &Session, key: &str, upload: &ImageUpload) -> Result<String> {
        let path = format!("storage/v1/object/{}/{}", self.bucket, key);
        let url = self.client.url(&path, &Query::new())?;
        tracing::debug!(bucket = %self.bucket, key, size = upload.size(), "uploading object");

        let request = self
            .client
            .request(Method::POST, url, Some(session))
            .header("content-type", upload.content_type.as_ref())
            .header("cache-control", format!("max-age={CACHE_MAX_AGE_SECS}"))
            .header("x-upsert", "false")
            .body(upload.bytes.clone());
        let response: UploadResponse = self.client.send_json(request, "upload object").await?;

        // The API answers with "{bucket}/{key}"; callers want the in-bucket path.
        let stored = response
            .key
            .as_deref()
            .and_then(|k| k.strip_prefix(&format!("{}/", self.bucket)).map(str::to_string))
            .unwrap_or_else(|| key.to_string());
        Ok(stored)
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.client.base_url(),
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}
