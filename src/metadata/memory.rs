//! In-memory metadata store.
//!
//! Stores all metadata in memory with no persistence. This is the
//! fallback backend when the persistent database cannot be opened at
//! startup, and the store used by most tests. Uses `RwLock` for
//! thread-safe access; no lock is held across an await point.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{now_micros, ImageRecord, MetadataStore, UserRecord};

#[derive(Debug, Default)]
struct Inner {
    users: Vec<UserRecord>,
    /// Images in insertion order.
    images: Vec<ImageRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn find_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.users.iter().find(|u| u.email == email).cloned())
        })
    }

    fn insert_user(
        &self,
        record: UserRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            if inner.users.iter().any(|u| u.email == record.email) {
                return Ok(false);
            }
            inner.users.push(record);
            Ok(true)
        })
    }

    fn list_images(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ImageRecord>>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            // Reverse first so the stable sort keeps later insertions ahead on ties.
            let mut images: Vec<_> = inner.images.iter().rev().cloned().collect();
            images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(images)
        })
    }

    fn insert_image(
        &self,
        title: &str,
        url: &str,
        remote_object_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ImageRecord>> + Send + '_>> {
        let record = ImageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            url: url.to_string(),
            remote_object_id: remote_object_id.to_string(),
            created_at: now_micros(),
        };
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            inner.images.push(record.clone());
            Ok(record)
        })
    }

    fn find_image(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.images.iter().find(|i| i.id == id).cloned())
        })
    }

    fn update_image_title(
        &self,
        id: &str,
        title: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>> {
        let id = id.to_string();
        let title = title.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Ok(inner.images.iter_mut().find(|i| i.id == id).map(|image| {
                image.title = title;
                image.clone()
            }))
        })
    }

    fn delete_image(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let position = inner.images.iter().position(|i| i.id == id);
            Ok(position.map(|idx| inner.images.remove(idx)))
        })
    }
}
