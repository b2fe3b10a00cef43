//! codeshare/crates/domains/src/lib.rs
//!
//! The domain models, port definitions and client-side rules for codeshare.
//! No I/O lives here; adapters implement the ports, services drive them.

pub mod errors;
pub mod feed;
pub mod models;
pub mod ports;
pub mod validation;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use feed::*;
pub use models::*;
pub use ports::*;
pub use validation::*;
