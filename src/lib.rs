//! Gallery library -- image gallery HTTP backend.
//!
//! This crate provides the components for running the gallery server:
//! request handling, bearer-token authentication, a dual-mode metadata
//! store (persistent with an in-memory fallback), upload staging and the
//! remote media host client.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod media;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod upload;

use crate::auth::TokenService;
use crate::config::Config;
use crate::media::backend::MediaBackend;
use crate::metadata::mode::StorageMode;
use crate::metadata::store::MetadataStore;
use crate::upload::UploadStaging;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Which metadata backend was selected at startup.
    pub mode: StorageMode,
    /// Metadata store (SQLite or in-memory).
    pub metadata: Arc<dyn MetadataStore>,
    /// Remote media host.
    pub media: Arc<dyn MediaBackend>,
    /// Bearer token issuer and verifier.
    pub tokens: TokenService,
    /// Upload staging directory and size cap.
    pub staging: UploadStaging,
}
