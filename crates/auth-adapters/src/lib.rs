//! Identity provider adapters.
//!
//! `gotrue` talks to the hosted auth API; `memory` keeps accounts in process.
//! Both publish auth changes on a broadcast stream consumed by the session
//! container and by the optional auto-refresh task.

mod hub;
pub mod pkce;
pub mod refresh;

#[cfg(feature = "gotrue")]
pub mod gotrue;
#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "gotrue")]
pub use gotrue::GoTrueIdentity;
#[cfg(feature = "memory")]
pub use memory::InMemoryIdentity;
pub use refresh::{spawn_auto_refresh, RefreshHandle};
