//! In-memory media host.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>` keyed by
//! public id.  URLs are built from a configurable base so records look
//! like real hosted images.  An outage switch makes every call fail,
//! which lets callers exercise their remote-failure paths.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use super::backend::{MediaBackend, RemoteObject};

/// A stored object's bytes plus its declared type.
#[derive(Debug, Clone)]
pub struct HostedMedia {
    pub data: Bytes,
    pub content_type: String,
}

pub struct MemoryMediaBackend {
    base_url: String,
    folder: String,
    objects: tokio::sync::RwLock<HashMap<String, HostedMedia>>,
    /// When set, uploads and deletes fail.
    unavailable: AtomicBool,
}

impl MemoryMediaBackend {
    pub fn new(base_url: &str, folder: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            folder: folder.to_string(),
            objects: tokio::sync::RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Toggle the simulated outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of hosted objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fetch a hosted object.
    pub async fn get(&self, public_id: &str) -> Option<HostedMedia> {
        self.objects.read().await.get(public_id).cloned()
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("media host unavailable");
        }
        Ok(())
    }
}

impl MediaBackend for MemoryMediaBackend {
    fn upload(
        &self,
        path: &Path,
        file_name: &str,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RemoteObject>> + Send + '_>> {
        let path = path.to_path_buf();
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        let content_type = content_type.to_string();
        Box::pin(async move {
            self.check_available()?;
            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read staged file {path:?}: {e}"))?;

            let public_id = format!("{}/{}", self.folder, uuid::Uuid::new_v4().simple());
            let url = format!("{}/{}.{}", self.base_url, public_id, extension);

            self.objects.write().await.insert(
                public_id.clone(),
                HostedMedia {
                    data: Bytes::from(data),
                    content_type,
                },
            );
            Ok(RemoteObject { url, public_id })
        })
    }

    fn delete(
        &self,
        public_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let public_id = public_id.to_string();
        Box::pin(async move {
            self.check_available()?;
            self.objects.write().await.remove(&public_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let media = MemoryMediaBackend::new("http://localhost:5000/media/", "gallery");
        let object = media.upload(&path, "Sunset.PNG", "image/png").await.unwrap();

        assert!(object.public_id.starts_with("gallery/"));
        assert!(object.url.starts_with("http://localhost:5000/media/gallery/"));
        assert!(object.url.ends_with(".png"));
        let hosted = media.get(&object.public_id).await.unwrap();
        assert_eq!(hosted.data.as_ref(), b"\x89PNG fake");
        assert_eq!(hosted.content_type, "image/png");

        media.delete(&object.public_id).await.unwrap();
        assert!(media.is_empty().await);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged.png");
        std::fs::write(&path, b"data").unwrap();

        let media = MemoryMediaBackend::new("http://localhost", "gallery");
        media.set_unavailable(true);
        assert!(media.upload(&path, "a.png", "image/png").await.is_err());
        assert!(media.delete("gallery/x").await.is_err());
        media.set_unavailable(false);
        assert!(media.upload(&path, "a.png", "image/png").await.is_ok());
        assert_eq!(media.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_staged_file() {
        let media = MemoryMediaBackend::new("http://localhost", "gallery");
        let result = media
            .upload(Path::new("/nonexistent/file.png"), "file.png", "image/png")
            .await;
        assert!(result.is_err());
        assert!(media.is_empty().await);
    }
}
