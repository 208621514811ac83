//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls run under a `Mutex` on the blocking pool.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch;
//! `rowid` breaks ordering ties so listing follows insertion order.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{now_micros, ImageRecord, MetadataStore, UserRecord};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, shared with blocking-pool tasks.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// This is idempotent -- safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id             TEXT PRIMARY KEY,
                email          TEXT NOT NULL UNIQUE,
                password_hash  TEXT NOT NULL,
                is_admin       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS images (
                id                TEXT PRIMARY KEY,
                title             TEXT NOT NULL,
                url               TEXT NOT NULL,
                remote_object_id  TEXT NOT NULL,
                created_at        INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_images_created_at
                ON images(created_at);
            ",
        )?;

        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.map_or(true, |v| v < SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, Utc::now().timestamp()],
            )?;
        }

        Ok(())
    }

    /// Run `f` against the connection on the blocking pool so SQLite I/O
    /// and lock waits never stall a runtime worker.
    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("mutex poisoned");
            f(&mut conn)
        })
        .await?
    }

    /// Users without password hashes, for operator tooling.
    pub fn user_summaries(&self) -> anyhow::Result<Vec<(String, bool)>> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let mut stmt = conn.prepare("SELECT email, is_admin FROM users ORDER BY email")?;
        let rows = stmt.query_map([], |row| {
            let is_admin: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, is_admin != 0))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

fn map_image_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        remote_object_id: row.get(3)?,
        created_at: micros_to_datetime(row.get(4)?),
    })
}

fn select_image(conn: &Connection, id: &str) -> rusqlite::Result<Option<ImageRecord>> {
    conn.query_row(
        "SELECT id, title, url, remote_object_id, created_at FROM images WHERE id = ?1",
        params![id],
        map_image_row,
    )
    .optional()
}

impl MetadataStore for SqliteMetadataStore {
    // ── Users ───────────────────────────────────────────────────────

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(self.with_conn(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, email, password_hash, is_admin FROM users WHERE email = ?1",
                    params![email],
                    |row| {
                        let is_admin: i64 = row.get(3)?;
                        Ok(UserRecord {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            password_hash: row.get(2)?,
                            is_admin: is_admin != 0,
                        })
                    },
                )
                .optional()?;
            Ok(result)
        }))
    }

    fn insert_user(
        &self,
        record: UserRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        Box::pin(self.with_conn(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO users (id, email, password_hash, is_admin)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.email,
                    record.password_hash,
                    record.is_admin as i64
                ],
            )?;
            Ok(changed == 1)
        }))
    }

    // ── Images ──────────────────────────────────────────────────────

    fn list_images(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ImageRecord>>> + Send + '_>> {
        Box::pin(self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, url, remote_object_id, created_at
                 FROM images ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map([], map_image_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        }))
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
        Box::pin(self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO images (id, title, url, remote_object_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.title,
                    record.url,
                    record.remote_object_id,
                    record.created_at.timestamp_micros(),
                ],
            )?;
            Ok(record)
        }))
    }

    fn find_image(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(self.with_conn(move |conn| Ok(select_image(conn, &id)?)))
    }

    fn update_image_title(
        &self,
        id: &str,
        title: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>> {
        let id = id.to_string();
        let title = title.to_string();
        Box::pin(self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE images SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Ok(select_image(conn, &id)?)
        }))
    }

    fn delete_image(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ImageRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let Some(record) = select_image(&tx, &id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM images WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(Some(record))
        }))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
