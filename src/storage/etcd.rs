//! etcd 存储实现
//!
//! 每个服务对应一个 JSON 文档，键为 `<namespace>/services/<id>`。
//! 列表通过键前缀查询完成，不需要额外的索引，单个键的写入天然是原子的。

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, DeleteOptions, GetOptions, Txn, TxnOp};
use tracing::{info, warn};

use super::ServiceStorage;
use crate::error::StorageResult;
use crate::registry::ServiceRecord;

const DEFAULT_NAMESPACE: &str = "flare";

/// etcd 存储
#[derive(Clone)]
pub struct EtcdStorage {
    client: Client,
    namespace: String,
}

impl EtcdStorage {
    pub async fn connect(endpoints: &[String], namespace: impl Into<String>) -> StorageResult<Self> {
        let client = Client::connect(endpoints, None).await?;
        let mut namespace = namespace.into();
        if namespace.is_empty() {
            namespace = DEFAULT_NAMESPACE.to_string();
        }
        info!(namespace = %namespace, endpoints = ?endpoints, "etcd service storage connected");
        Ok(Self { client, namespace })
    }

    fn prefix(&self) -> String {
        format!("{}/services/", self.namespace)
    }

    fn document_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }
}

#[async_trait]
impl ServiceStorage for EtcdStorage {
    async fn register_service(&self, record: &ServiceRecord) -> StorageResult<()> {
        let value = serde_json::to_vec(record)?;
        let mut client = self.client.clone();
        client.put(self.document_key(&record.id), value, None).await?;
        Ok(())
    }

    async fn deregister_service(&self, id: &str) -> StorageResult<bool> {
        let mut client = self.client.clone();
        let resp = client.delete(self.document_key(id), None).await?;
        Ok(resp.deleted() > 0)
    }

    async fn get_service(&self, id: &str) -> StorageResult<Option<ServiceRecord>> {
        let mut client = self.client.clone();
        let resp = client.get(self.document_key(id), None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(serde_json::from_slice(kv.value())?)),
            None => Ok(None),
        }
    }

    async fn update_service(&self, record: &ServiceRecord) -> StorageResult<bool> {
        let key = self.document_key(&record.id);
        let value = serde_json::to_vec(record)?;
        // version > 0 表示键已存在
        let txn = Txn::new()
            .when(vec![Compare::version(key.clone(), CompareOp::Greater, 0)])
            .and_then(vec![TxnOp::put(key, value, None)]);
        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        Ok(resp.succeeded())
    }

    async fn get_all_services(&self) -> StorageResult<Vec<ServiceRecord>> {
        let mut client = self.client.clone();
        let resp = client
            .get(self.prefix(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut records = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            match serde_json::from_slice::<ServiceRecord>(kv.value()) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(kv.key()),
                    error = %e,
                    "skipping malformed service document"
                ),
            }
        }
        Ok(records)
    }

    async fn clear_services(&self) -> StorageResult<()> {
        let mut client = self.client.clone();
        client
            .delete(self.prefix(), Some(DeleteOptions::new().with_prefix()))
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "etcd"
    }
}
