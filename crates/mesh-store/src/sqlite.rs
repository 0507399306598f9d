// ABOUTME: SQLite persistence for registry records
// ABOUTME: One table, partitioned by collection name, holding opaque blobs keyed by id

use crate::{Record, RecordStore, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

/// Record store backed by SQLite.
///
/// Several collections can share one database file; use [`SqliteStore::collection`]
/// to get a handle scoped to another collection on the same pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    collection: String,
}

impl SqliteStore {
    /// Open or create the store at the given path, scoped to `collection`.
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self {
            pool,
            collection: collection.to_string(),
        };
        store.init_schema().await?;
        tracing::debug!(path = %path.display(), collection = %collection, "record store opened");
        Ok(store)
    }

    /// A handle on another collection sharing this store's pool.
    pub fn collection(&self, collection: &str) -> Self {
        Self {
            pool: self.pool.clone(),
            collection: collection.to_string(),
        }
    }

    async fn init_schema(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Record {
        let created_str: String = row.get("created_at");
        Record {
            id: row.get("id"),
            data: row.get("data"),
            created_at: DateTime::parse_from_rfc3339(&created_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_record(&self, id: &str, data: Vec<u8>) -> Result<Record> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO records (collection, id, data, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, id) DO NOTHING
            "#,
        )
        .bind(&self.collection)
        .bind(id)
        .bind(&data)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }

        Ok(Record {
            id: id.to_string(),
            data,
            created_at,
        })
    }

    async fn get_record(&self, id: &str) -> Result<Record> {
        let row = sqlx::query(
            "SELECT id, data, created_at FROM records WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_record(&row))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_records(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT id, data, created_at FROM records WHERE collection = ? ORDER BY id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn count_records(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
