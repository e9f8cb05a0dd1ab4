//! 内存存储实现
//!
//! 单进程使用，也是其他后端行为的参照实现。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ServiceStorage;
use crate::error::StorageResult;
use crate::registry::ServiceRecord;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, ServiceRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ServiceStorage for MemoryStorage {
    async fn register_service(&self, record: &ServiceRecord) -> StorageResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn deregister_service(&self, id: &str) -> StorageResult<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }

    async fn get_service(&self, id: &str) -> StorageResult<Option<ServiceRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn update_service(&self, record: &ServiceRecord) -> StorageResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_all_services(&self) -> StorageResult<Vec<ServiceRecord>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn clear_services(&self) -> StorageResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
