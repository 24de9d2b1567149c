//! HTTP surface for the scribe service.
//!
//! `api_router()` returns a composable `Router`; `server` binds it and owns
//! the shutdown channel.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
