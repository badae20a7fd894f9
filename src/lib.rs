//! obs-access-signer library — access-signing redirect gateway.
//!
//! This crate provides the components for running a small HTTP gateway in
//! front of a private object-storage bucket: request paths are resolved to
//! object keys, existence is checked against the backing store, and the
//! caller is redirected to a freshly signed URL instead of being proxied
//! the object bytes.

use std::sync::Arc;

pub mod backend;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod policy;
pub mod server;
pub mod sign;

use crate::backend::Backend;
use crate::config::Config;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The signing backend selected at startup.
    pub backend: Arc<dyn Backend>,
}
