//! # Hosted platform adapters
//!
//! Row storage over PostgREST (`/rest/v1`) and object storage
//! (`/storage/v1`). All repositories share one [`RestClient`].

mod client;
mod comments;
mod error;
mod likes;
mod posts;
mod profiles;
mod query;
mod rows;
mod storage;

pub use client::RestClient;
pub use comments::RestCommentRepository;
pub use likes::RestLikeRepository;
pub use posts::RestPostRepository;
pub use profiles::RestProfileRepository;
pub use query::{Direction, Query};
pub use storage::BucketStorage;
