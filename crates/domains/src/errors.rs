//! # DomainError
//!
//! Centralized error handling for the codeshare client.
//! Every port and every state container speaks this one error type.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// The primary error type for all domain and adapter operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// The operation needs a signed-in viewer and there is none.
    #[error("authentication required")]
    Unauthenticated,

    /// Client-side field constraints rejected the input before any remote call.
    #[error("validation error: {0}")]
    Validation(ValidationErrors),

    /// Resource not found (e.g., Post, Comment, Profile)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Resource already exists (e.g., a like or profile row inserted twice)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network or server failure from the Remote Data Service.
    #[error("remote service error: {0}")]
    Remote(String),
}

impl DomainError {
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ValidationErrors> for DomainError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// A specialized Result type for codeshare logic.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Per-field validation messages, keyed by the field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}
