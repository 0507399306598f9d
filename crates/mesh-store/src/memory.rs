// ABOUTME: In-memory record store for tests and single-process collectors
// ABOUTME: BTreeMap behind an async RwLock, ordered by record id

use crate::{Record, RecordStore, Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Volatile store; contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_record(&self, id: &str, data: Vec<u8>) -> Result<Record> {
        let mut records = self.records.write().await;
        match records.entry(id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(id.to_string())),
            Entry::Vacant(slot) => {
                let record = Record {
                    id: id.to_string(),
                    data,
                    created_at: Utc::now(),
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get_record(&self, id: &str) -> Result<Record> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_records(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn count_records(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}
