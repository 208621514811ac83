//! Abstract media backend trait.
//!
//! Every media host must implement [`MediaBackend`].  Callers hand over a
//! staged local file and get back a public URL plus the opaque object id
//! needed to delete it later.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// An object published on the media host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Fully-qualified public URL.
    pub url: String,
    /// Opaque object id on the host.
    pub public_id: String,
}

/// Async media host contract.
pub trait MediaBackend: Send + Sync + 'static {
    /// Publish the file at `path`. `file_name` and `content_type` describe
    /// the original upload.
    fn upload(
        &self,
        path: &Path,
        file_name: &str,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RemoteObject>> + Send + '_>>;

    /// Remove the object addressed by `public_id`.
    fn delete(
        &self,
        public_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}
