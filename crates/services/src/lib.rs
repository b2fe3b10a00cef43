//! codeshare/crates/services/src/lib.rs
//!
//! Observable state containers over the domain ports. Each container keeps
//! its state in a `watch` channel: callers read snapshots or subscribe, and
//! trigger async operations that patch the state once the remote call
//! returns.

pub mod context;
pub mod posts;
pub mod profile;
pub mod session;
mod state;
pub mod uploads;

pub use context::{AppContext, Backend, ContextOptions};
pub use posts::{PostsPorts, PostsState, PostsStore};
pub use profile::{ProfileState, ProfileStore};
pub use session::{OAuthSettings, SessionStore, SessionSubscription};
pub use state::SIGN_IN_REQUIRED;
pub use uploads::{ImageUploader, UploadState};
