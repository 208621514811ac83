//! Storage mode selection and default account seeding.
//!
//! The persistent store is tried exactly once at startup. Whatever is
//! chosen stays authoritative for the life of the process: a later
//! database outage does not demote to memory, and a later recovery does
//! not promote back.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use super::memory::MemoryMetadataStore;
use super::sqlite::SqliteMetadataStore;
use super::store::{MetadataStore, UserRecord};
use crate::auth::hash_password;
use crate::config::DatabaseConfig;

/// Seeded admin account.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@gmail.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Non-admin account seeded only into the in-memory store.
pub const DEFAULT_USER_EMAIL: &str = "user@gmail.com";
pub const DEFAULT_USER_PASSWORD: &str = "password123";

/// Which backend is authoritative for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Persistent,
    InMemory,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Persistent => "persistent",
            StorageMode::InMemory => "memory",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The store chosen at startup.
pub struct SelectedStore {
    pub mode: StorageMode,
    pub store: Arc<dyn MetadataStore>,
}

/// Strip an optional `sqlite://` scheme from a connection string.
pub fn database_path(url: &str) -> &str {
    url.strip_prefix("sqlite://").unwrap_or(url)
}

/// Open the persistent database at `url`, creating parent directories.
///
/// URLs with any scheme other than `sqlite://` are refused.
fn open_persistent(url: &str) -> anyhow::Result<SqliteMetadataStore> {
    if let Some((scheme, _)) = url.split_once("://") {
        if scheme != "sqlite" {
            anyhow::bail!("unsupported database scheme '{scheme}'");
        }
    }
    let path = database_path(url);
    if path != ":memory:" {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    SqliteMetadataStore::new(path)
}

/// Choose the backend once and seed its default accounts.
///
/// Any failure to open the persistent store (including no URL at all)
/// selects the in-memory store. Seeding errors are returned.
pub async fn select_store(config: &DatabaseConfig) -> anyhow::Result<SelectedStore> {
    let opened = match config.url.as_deref() {
        Some(url) => open_persistent(url).map_err(|e| {
            warn!("Persistent store unavailable ({e:#}), falling back to in-memory store");
        }),
        None => {
            warn!("No database URL configured, using in-memory store");
            Err(())
        }
    };

    let selected = match opened {
        Ok(sqlite) => {
            let store: Arc<dyn MetadataStore> = Arc::new(sqlite);
            seed_admin(store.as_ref()).await?;
            SelectedStore {
                mode: StorageMode::Persistent,
                store,
            }
        }
        Err(()) => {
            let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
            seed_admin(store.as_ref()).await?;
            seed_user(store.as_ref()).await?;
            SelectedStore {
                mode: StorageMode::InMemory,
                store,
            }
        }
    };

    info!("Storage mode: {}", selected.mode);
    Ok(selected)
}

async fn seed_account(
    store: &dyn MetadataStore,
    email: &str,
    password: &str,
    is_admin: bool,
) -> anyhow::Result<()> {
    if store.find_user_by_email(email).await?.is_some() {
        return Ok(());
    }
    let record = UserRecord {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: hash_password(password.to_string()).await?,
        is_admin,
    };
    if store.insert_user(record).await? {
        info!("Seeded account {email}");
    }
    Ok(())
}

/// Ensure the default admin exists. Idempotent.
pub async fn seed_admin(store: &dyn MetadataStore) -> anyhow::Result<()> {
    seed_account(store, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD, true).await
}

/// Ensure the default non-admin exists. Idempotent.
pub async fn seed_user(store: &dyn MetadataStore) -> anyhow::Result<()> {
    seed_account(store, DEFAULT_USER_EMAIL, DEFAULT_USER_PASSWORD, false).await
}
