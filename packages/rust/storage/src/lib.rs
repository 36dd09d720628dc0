//! libSQL storage layer for the skill catalog.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding crawl
//! sources, raw documents and their state machine, catalog entries with
//! their taxonomy and source links, and system settings.
//!
//! **Access rules:**
//! - Worker / CLI mutations: read-write via [`Storage::open`]
//! - Status reporting: read-only via [`Storage::open_readonly`]

mod catalog;
mod migrations;
mod raw;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use skillcatalog_shared::{CatalogError, Result, Source, SourceKind};

pub use catalog::{EntryGap, TaxonomyTable};
pub use raw::{NewRawDocument, RawStatusCounts, RawUpsert, RequeueFilter};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(CatalogError::storage)?;

        let conn = db.connect().map_err(CatalogError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` without running migrations or writing.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(CatalogError::storage)?;

        let conn = db.connect().map_err(CatalogError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    CatalogError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CatalogError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Source operations
    // -----------------------------------------------------------------------

    /// Register a source, refreshing its display fields if it already exists.
    pub async fn ensure_source(&self, source: &Source) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO sources (id, name, url, kind, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   url = excluded.url,
                   kind = excluded.kind,
                   is_active = excluded.is_active",
                params![
                    source.id.as_str(),
                    source.name.as_str(),
                    source.url.as_str(),
                    source.kind.as_str(),
                    i64::from(source.is_active),
                    now.as_str(),
                ],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(())
    }

    /// Get a source by ID.
    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, url, kind, is_active FROM sources WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(CatalogError::storage)?;

        match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Ok(Some(row_to_source(&row)?)),
            None => Ok(None),
        }
    }

    /// List all registered sources ordered by ID.
    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, url, kind, is_active FROM sources ORDER BY id",
                params![],
            )
            .await
            .map_err(CatalogError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            results.push(row_to_source(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // System settings
    // -----------------------------------------------------------------------

    /// Read and deserialize a setting. Malformed values are logged and ignored.
    pub async fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_json FROM system_settings WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(CatalogError::storage)?;

        let Some(row) = rows.next().await.map_err(CatalogError::storage)? else {
            return Ok(None);
        };
        let raw: String = row.get(0).map_err(CatalogError::storage)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring malformed system setting");
                Ok(None)
            }
        }
    }

    /// Serialize and store a setting (upserts).
    pub async fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.check_writable()?;
        let json = serde_json::to_string(value)
            .map_err(|e| CatalogError::Storage(format!("serialize setting {key}: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO system_settings (key, value_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value_json = excluded.value_json,
                   updated_at = excluded.updated_at",
                params![key, json.as_str(), now.as_str()],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn row_to_source(row: &libsql::Row) -> Result<Source> {
    let kind: String = row.get(3).map_err(CatalogError::storage)?;
    Ok(Source {
        id: row.get::<String>(0).map_err(CatalogError::storage)?,
        name: row.get::<String>(1).map_err(CatalogError::storage)?,
        url: row.get::<String>(2).map_err(CatalogError::storage)?,
        kind: kind.parse::<SourceKind>()?,
        is_active: row.get::<i64>(4).map_err(CatalogError::storage)? != 0,
    })
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatalogError::Storage(format!("invalid date '{s}': {e}")))
}

/// Read a nullable text column.
pub(crate) fn opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    pub(crate) fn repo_source(id: &str) -> Source {
        Source {
            id: id.into(),
            name: id.into(),
            url: format!("https://github.com/{id}"),
            kind: SourceKind::Repository,
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 2);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.expect("create"));
        let ro = Storage::open_readonly(&tmp).await.expect("open ro");
        let err = ro.ensure_source(&repo_source("a/b")).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn ensure_source_is_idempotent() {
        let storage = test_storage().await;
        let mut source = repo_source("anthropics/skills");
        storage.ensure_source(&source).await.unwrap();
        source.name = "Anthropic skills".into();
        storage.ensure_source(&source).await.unwrap();

        let sources = storage.list_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Anthropic skills");
        assert_eq!(
            storage.get_source("anthropics/skills").await.unwrap(),
            Some(source)
        );
    }

    #[tokio::test]
    async fn settings_roundtrip() {
        let storage = test_storage().await;
        assert!(
            storage
                .get_setting::<serde_json::Value>("missing")
                .await
                .unwrap()
                .is_none()
        );

        storage
            .put_setting("runtime_policy", &serde_json::json!({"enforce_spec": true}))
            .await
            .unwrap();
        storage
            .put_setting("runtime_policy", &serde_json::json!({"enforce_spec": false}))
            .await
            .unwrap();
        let value: serde_json::Value = storage
            .get_setting("runtime_policy")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["enforce_spec"], false);
    }
}
