//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so the SQLite and in-memory stores can sit behind the same
//! `Arc<dyn MetadataStore>`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use utoipa::ToSchema;

/// Title given to images uploaded without one.
pub const DEFAULT_TITLE: &str = "Untitled";

// ── Record types ───────────────────────────────────────────────────

/// Stored user account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Opaque identifier, unique per store.
    pub id: String,
    /// Login email (exact match, case-sensitive).
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Whether this account may upload, retitle and delete images.
    pub is_admin: bool,
}

/// Metadata record for one gallery image.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Opaque identifier, unique per store.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Public URL of the image on the media host.
    pub url: String,
    /// Object id used to address the image on the media host.
    pub remote_object_id: String,
    /// Creation time.
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

/// Resolve an optional upload title to the stored one.
pub fn title_or_default(title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// Current time truncated to microseconds, the precision both backends keep.
pub(crate) fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
///
/// Both backends must behave identically from the caller's side.
pub trait MetadataStore: Send + Sync + 'static {
    // ── Users ───────────────────────────────────────────────────────

    /// Look up a user by exact email.
    fn find_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Insert a user unless one with the same email exists.
    /// Returns `true` when the record was inserted.
    fn insert_user(
        &self,
        record: UserRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    // ── Images ──────────────────────────────────────────────────────

    /// List all images, newest first. Ties on `created_at` put the later
    /// insertion first.
    fn list_images(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ImageRecord>>> + Send + '_>>;

    /// Insert a new image with a fresh id and the current time.
    fn insert_image(
        &self,
        title: &str,
        url: &str,
        remote_object_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ImageRecord>> + Send + '_>>;

    /// Get a single image by id.
    fn find_image(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>>;

    /// Overwrite an image's title, returning the updated record.
    fn update_image_title(
        &self,
        id: &str,
        title: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>>;

    /// Remove an image, returning the removed record.
    fn delete_image(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>>;
}
