//! HTTP front end for the vfsgate virtual filesystem.
//!
//! Exposes the [`Gateway`](vfsgate_core::Gateway) operations under `/vfs`
//! behind token authentication.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
mod handlers;

pub use api::{AppState, create_router};
pub use config::{ConfigError, ServerConfig, UserConfig};
pub use error::ApiError;
