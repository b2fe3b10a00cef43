//! Client-side field constraints.
//!
//! Everything here runs before any remote call; a failure never reaches the
//! network and is reported per field.
//!
//! Lengths are counted in Unicode scalar values (`chars()`), not bytes.

use crate::errors::{Result, ValidationErrors};
use crate::models::{ImageUpload, NewPost, PostPatch, ProfileUpdate};

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 100;
pub const SUMMARY_MIN_CHARS: usize = 20;
pub const SUMMARY_MAX_CHARS: usize = 500;
pub const CODE_MIN_CHARS: usize = 10;
pub const MAX_TAGS: usize = 5;
pub const BIO_MAX_CHARS: usize = 500;
pub const FULL_NAME_MAX_CHARS: usize = 100;
pub const IMAGE_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_LANGUAGE: &str = "dart";

/// Ordered, case-folded, de-duplicated tags; at most [`MAX_TAGS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    tags: Vec<String>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag after trimming and lower-casing it.
    ///
    /// Returns `false` (and leaves the list unchanged) for blank input, a
    /// duplicate, or when the list is already full.
    pub fn add(&mut self, raw: &str) -> bool {
        let tag = raw.trim().to_lowercase();
        if tag.is_empty() || self.is_full() || self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn is_full(&self) -> bool {
        self.tags.len() >= MAX_TAGS
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    pub fn into_vec(self) -> Vec<String> {
        self.tags
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = TagList::new();
        for tag in iter {
            list.add(tag.as_ref());
        }
        list
    }
}

/// Post form contents as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub summary: String,
    pub code_content: String,
    pub programming_language: String,
    pub tags: TagList,
    pub image_url: Option<String>,
}

impl PostDraft {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        code_content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            code_content: code_content.into(),
            programming_language: DEFAULT_LANGUAGE.to_string(),
            tags: TagList::new(),
            image_url: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.programming_language = language.into();
        self
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Checks every field and returns all failures at once.
    pub fn validate(self) -> Result<NewPost> {
        let mut errors = ValidationErrors::new();
        check_bounded(&mut errors, "title", &self.title, TITLE_MIN_CHARS, Some(TITLE_MAX_CHARS));
        check_bounded(&mut errors, "summary", &self.summary, SUMMARY_MIN_CHARS, Some(SUMMARY_MAX_CHARS));
        check_bounded(&mut errors, "code_content", &self.code_content, CODE_MIN_CHARS, None);
        errors.into_result()?;

        Ok(NewPost {
            title: self.title,
            summary: self.summary,
            code_content: self.code_content,
            programming_language: self.programming_language,
            tags: self.tags.into_vec(),
            image_url: self.image_url,
        })
    }
}

impl PostPatch {
    /// Applies the draft constraints to whichever fields are present and
    /// normalizes the tag list.
    pub fn validate(mut self) -> Result<PostPatch> {
        let mut errors = ValidationErrors::new();
        if let Some(title) = &self.title {
            check_bounded(&mut errors, "title", title, TITLE_MIN_CHARS, Some(TITLE_MAX_CHARS));
        }
        if let Some(summary) = &self.summary {
            check_bounded(&mut errors, "summary", summary, SUMMARY_MIN_CHARS, Some(SUMMARY_MAX_CHARS));
        }
        if let Some(code) = &self.code_content {
            check_bounded(&mut errors, "code_content", code, CODE_MIN_CHARS, None);
        }
        // Count after case-folding and de-duplication, like `TagList` does.
        let tags = self.tags.take().map(|raw| normalize_tags(&raw));
        if let Some(tags) = &tags {
            if tags.len() > MAX_TAGS {
                errors.add("tags", format!("at most {MAX_TAGS} tags are allowed"));
            }
        }
        errors.into_result()?;

        self.tags = tags;
        Ok(self)
    }
}

/// Trimmed, lower-cased, first occurrence wins, blanks dropped. Not capped.
fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw.iter().map(|t| t.trim().to_lowercase()) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        if let Some(bio) = &self.bio {
            check_max(&mut errors, "bio", bio, BIO_MAX_CHARS);
        }
        if let Some(name) = &self.full_name {
            check_max(&mut errors, "full_name", name, FULL_NAME_MAX_CHARS);
        }
        errors.into_result()
    }
}

/// Trims a comment body; a blank comment is rejected.
pub fn validate_comment(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("content", "comment is required");
        return Err(errors.into());
    }
    Ok(trimmed.to_string())
}

/// Accepts only `image/*` payloads of at most `max_bytes`.
pub fn validate_image(upload: &ImageUpload, max_bytes: usize) -> Result<()> {
    let mut errors = ValidationErrors::new();
    if upload.content_type.type_() != mime::IMAGE {
        errors.add("image", "please select a valid image file");
    } else if upload.size() > max_bytes {
        errors.add("image", format!("file size must not exceed {} MB", max_bytes / (1024 * 1024)));
    }
    errors.into_result()
}

fn check_bounded(errors: &mut ValidationErrors, field: &str, value: &str, min: usize, max: Option<usize>) {
    if value.trim().is_empty() {
        errors.add(field, format!("{field} is required"));
        return;
    }
    let len = value.chars().count();
    if len < min {
        errors.add(field, format!("{field} must contain at least {min} characters"));
    } else if let Some(max) = max {
        check_max(errors, field, value, max);
    }
}

fn check_max(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, format!("{field} must not exceed {max} characters"));
    }
}
