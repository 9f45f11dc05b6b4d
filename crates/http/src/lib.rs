//! Swiftmeal HTTP client
//!
//! Authenticated access to the Swiftmeal delivery API. Every call goes
//! through [`client::ApiClient`], which attaches the stored bearer token,
//! strips the `{ success, data }` envelope, maps failures to user-readable
//! messages and coordinates a single token refresh per burst of expired
//! requests.

#[macro_use]
extern crate tracing;

pub mod client;
pub mod config;
pub mod session;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, error::ClientError};
pub use config::ClientConfig;
pub use session::{
    Persistence, Session, SessionInfo, SessionStore, StorageError, TieredSessionStore,
};
