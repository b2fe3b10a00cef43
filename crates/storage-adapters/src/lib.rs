//! # storage-adapters
//!
//! Implementations of the `domains` storage ports:
//!
//! - `rest` (default): the hosted platform's PostgREST row API and object
//!   storage bucket, over reqwest.
//! - `memory`: a DashMap-backed stand-in with the same observable behavior,
//!   for local development and tests.

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "rest")]
pub mod rest;

#[cfg(feature = "memory")]
pub use memory::InMemoryBackend;
#[cfg(feature = "rest")]
pub use rest::{
    BucketStorage, RestClient, RestCommentRepository, RestLikeRepository, RestPostRepository,
    RestProfileRepository,
};
