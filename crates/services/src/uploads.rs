//! Image upload helper for post illustrations.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use domains::{validate_image, DomainError, ImageUpload, MediaStorage, Result, Session, UserId};
use tokio::sync::watch;

use crate::state::{user_message, StateCell};

pub const UPLOAD_FAILED: &str = "failed to upload image";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    pub is_uploading: bool,
    pub error: Option<String>,
}

pub struct ImageUploader {
    storage: Arc<dyn MediaStorage>,
    session: watch::Receiver<Option<Session>>,
    max_bytes: usize,
    state: StateCell<UploadState>,
}

impl ImageUploader {
    pub fn new(storage: Arc<dyn MediaStorage>, session: watch::Receiver<Option<Session>>, max_bytes: usize) -> Self {
        Self { storage, session, max_bytes, state: StateCell::new(UploadState::default()) }
    }

    pub fn snapshot(&self) -> UploadState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// Validates and stores the image, returning its public URL.
    #[tracing::instrument(skip(self, image), fields(file = %image.file_name, size = image.size()))]
    pub async fn upload(&self, image: ImageUpload) -> Result<String> {
        self.state.update(|s| {
            s.is_uploading = true;
            s.error = None;
        });

        let result = async {
            validate_image(&image, self.max_bytes)?;
            let session = self.session.borrow().clone().ok_or(DomainError::Unauthenticated)?;
            let key = object_key(session.user_id(), Utc::now().timestamp_millis(), &image);
            let path = self.storage.upload(&session, &key, &image).await?;
            Ok(self.storage.public_url(&path))
        }
        .await;

        let error = match &result {
            Ok(url) => {
                tracing::info!(%url, "image uploaded");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "{UPLOAD_FAILED}");
                Some(user_message(UPLOAD_FAILED, e))
            }
        };
        self.state.update(|s| {
            s.is_uploading = false;
            s.error = error;
        });
        result
    }
}

/// `{user_id}/{unix_millis}.{ext}`; the extension comes from the file name,
/// or from the MIME type when the name has none or it is not plain ASCII
/// alphanumerics. The key ends up in a URL path unescaped.
pub fn object_key(user_id: UserId, unix_millis: i64, image: &ImageUpload) -> String {
    format!("{user_id}/{unix_millis}.{}", extension(image))
}

fn extension(image: &ImageUpload) -> String {
    if let Some(ext) = Path::new(&image.file_name).extension().and_then(|e| e.to_str()) {
        if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_ascii_lowercase();
        }
    }
    let subtype = image.content_type.subtype().as_str();
    mime_guess::get_mime_extensions(&image.content_type)
        .and_then(|exts| exts.iter().find(|e| **e == subtype).or_else(|| exts.first()))
        .map_or_else(|| "bin".to_string(), |e| e.to_string())
}

impl std::fmt::Debug for ImageUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUploader")
            .field("max_bytes", &self.max_bytes)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
