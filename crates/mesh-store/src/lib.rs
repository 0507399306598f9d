// ABOUTME: Record store contract consumed by the registry server
// ABOUTME: Opaque id -> bytes storage with create-if-absent, point reads, and enumeration

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A stored blob and its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Errors returned by record stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record with this id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A record with this id already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Key/blob storage. Records are immutable once created.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, failing with [`StoreError::AlreadyExists`] if the id is taken.
    async fn create_record(&self, id: &str, data: Vec<u8>) -> Result<Record>;

    /// Point read, failing with [`StoreError::NotFound`] when absent.
    async fn get_record(&self, id: &str) -> Result<Record>;

    /// All records ordered by id.
    async fn list_records(&self) -> Result<Vec<Record>>;

    async fn count_records(&self) -> Result<u64>;
}
