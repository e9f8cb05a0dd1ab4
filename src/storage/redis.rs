//! Redis 存储实现
//!
//! 键布局：
//! - `<namespace>:service:<id>`：服务记录（JSON）
//! - `<namespace>:services`：全部服务 ID 的索引集合
//!
//! 注册和注销使用 `MULTI/EXEC` 事务批量提交，记录与索引同时生效；
//! 清空需要先读索引再删除，通过 Lua 脚本在服务端原子执行。

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::ServiceStorage;
use crate::error::StorageResult;
use crate::registry::ServiceRecord;

const DEFAULT_NAMESPACE: &str = "flare";

/// KEYS[1]：索引集合；ARGV[1]：记录键前缀。返回删除的记录数
const CLEAR_SCRIPT: &str = r"
local ids = redis.call('SMEMBERS', KEYS[1])
for _, id in ipairs(ids) do
    redis.call('DEL', ARGV[1] .. id)
end
redis.call('DEL', KEYS[1])
return #ids
";

#[derive(Clone)]
pub struct RedisStorage {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStorage {
    pub async fn connect(url: &str, namespace: impl Into<String>) -> StorageResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let mut namespace = namespace.into();
        if namespace.is_empty() {
            namespace = DEFAULT_NAMESPACE.to_string();
        }
        info!(namespace = %namespace, "redis service storage connected");
        Ok(Self { conn, namespace })
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}:service:{}", self.namespace, id)
    }

    fn index_key(&self) -> String {
        format!("{}:services", self.namespace)
    }
}

#[async_trait]
impl ServiceStorage for RedisStorage {
    async fn register_service(&self, record: &ServiceRecord) -> StorageResult<()> {
        let value = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let () = ::redis::pipe()
            .atomic()
            .set(self.record_key(&record.id), value)
            .ignore()
            .sadd(self.index_key(), &record.id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn deregister_service(&self, id: &str) -> StorageResult<bool> {
        let mut conn = self.conn.clone();
        let (deleted, _unindexed): (i64, i64) = ::redis::pipe()
            .atomic()
            .del(self.record_key(id))
            .srem(self.index_key(), id)
            .query_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn get_service(&self, id: &str) -> StorageResult<Option<ServiceRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.record_key(id)).await?;
        match raw {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn update_service(&self, record: &ServiceRecord) -> StorageResult<bool> {
        let value = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        // SET .. XX 只覆盖已存在的键，不会凭空创建未建索引的记录
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(self.record_key(&record.id))
            .arg(value)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get_all_services(&self) -> StorageResult<Vec<ServiceRecord>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.index_key()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.record_key(id)).collect();
        let values: Vec<Option<String>> = ::redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut records = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(value) = value else {
                continue;
            };
            match serde_json::from_str::<ServiceRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(service_id = %id, error = %e, "skipping malformed service record"),
            }
        }
        Ok(records)
    }

    async fn clear_services(&self) -> StorageResult<()> {
        // 读取索引与删除在同一个脚本内完成，清空期间并发写入的记录不会残留在索引之外
        let script = ::redis::Script::new(CLEAR_SCRIPT);
        let mut conn = self.conn.clone();
        let removed: i64 = script
            .key(self.index_key())
            .arg(format!("{}:service:", self.namespace))
            .invoke_async(&mut conn)
            .await?;
        debug!(namespace = %self.namespace, removed, "redis services cleared");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
