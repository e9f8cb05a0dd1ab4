//! 服务发现客户端集成测试

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use flare_discovery_core::config::RegistryConfig;
use flare_discovery_core::{
    DiscoverOptions, DiscoveryClient, InstanceQuery, LoadBalanceStrategy, MemoryStorage,
    ServiceRegistration, ServiceRegistry, ServiceStorage,
};

/// 按顺序写入 `api-a` / `api-b` / `api-c`，注册时间依次递增
async fn client_with_instances() -> (DiscoveryClient, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    for (id, secs_ago, port) in [("api-a", 30, 8001), ("api-b", 20, 8002), ("api-c", 10, 8003)] {
        let mut record = common::stale_record(id, "api", secs_ago);
        record.port = port;
        storage.register_service(&record).await.unwrap();
    }

    let registry = ServiceRegistry::new(
        RegistryConfig::default(),
        Some(storage.clone() as Arc<dyn ServiceStorage>),
    );
    (DiscoveryClient::new(registry), storage)
}

async fn pick(client: &DiscoveryClient, query: &InstanceQuery) -> String {
    client
        .get_service_instance("api", query)
        .await
        .map(|r| r.id)
        .unwrap()
}

#[tokio::test]
async fn round_robin_cycles_through_instances() {
    let (client, _storage) = client_with_instances().await;
    let query = InstanceQuery::default();

    let mut picks = Vec::new();
    for _ in 0..6 {
        picks.push(pick(&client, &query).await);
    }
    assert_eq!(
        picks,
        vec!["api-a", "api-b", "api-c", "api-a", "api-b", "api-c"]
    );
}

#[tokio::test]
async fn round_robin_index_is_taken_modulo_current_candidates() {
    let (client, storage) = client_with_instances().await;
    let query = InstanceQuery::new(LoadBalanceStrategy::RoundRobin);

    assert_eq!(pick(&client, &query).await, "api-a");
    assert_eq!(pick(&client, &query).await, "api-b");

    storage.deregister_service("api-a").await.unwrap();

    // 索引 2 对新的候选数 2 取模回到 0，api-b 被再次选中
    assert_eq!(pick(&client, &query).await, "api-b");
    assert_eq!(pick(&client, &query).await, "api-c");
    assert_eq!(client.last_candidates("api").len(), 2);
}

#[tokio::test]
async fn random_picks_a_candidate() {
    let (client, _storage) = client_with_instances().await;
    let query = InstanceQuery::new(LoadBalanceStrategy::Random);

    for _ in 0..20 {
        let id = pick(&client, &query).await;
        assert!(["api-a", "api-b", "api-c"].contains(&id.as_str()));
    }
}

#[tokio::test]
async fn consistent_hash_is_stable_for_a_key() {
    let (client, _storage) = client_with_instances().await;
    let query = InstanceQuery::new(LoadBalanceStrategy::ConsistentHash).with_hash_key("user-42");

    let first = pick(&client, &query).await;
    for _ in 0..10 {
        assert_eq!(pick(&client, &query).await, first);
    }
}

#[tokio::test]
async fn instance_filter_applies_metadata() {
    let (client, storage) = client_with_instances().await;
    let mut record = common::record("api-d", "api");
    record.metadata.insert("zone".to_string(), "b".to_string());
    storage.register_service(&record).await.unwrap();

    let query = InstanceQuery::default().with_filter(DiscoverOptions::new().with_metadata("zone", "b"));
    for _ in 0..3 {
        assert_eq!(pick(&client, &query).await, "api-d");
    }
}

#[tokio::test]
async fn no_instance_returns_none() {
    let (client, _storage) = client_with_instances().await;
    let query = InstanceQuery::default();

    assert!(client.get_service_instance("missing", &query).await.is_none());
    assert!(
        client
            .get_service_url("missing", "/health", &query)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn service_url_normalizes_path() {
    let (client, _storage) = client_with_instances().await;
    let query = InstanceQuery::default();

    let url = client.get_service_url("api", "health", &query).await;
    assert_eq!(url.as_deref(), Some("http://127.0.0.1:8001/health"));

    let url = client.get_service_url("api", "/v1/users", &query).await;
    assert_eq!(url.as_deref(), Some("http://127.0.0.1:8002/v1/users"));
}

#[tokio::test]
async fn client_manages_own_registration() {
    let (client, storage) = client_with_instances().await;
    assert!(client.own_id().is_none());
    assert!(!client.deregister().await);
    assert!(!client.update_metadata(HashMap::new()).await);

    let id = client
        .register(ServiceRegistration::new("gateway").with_host("127.0.0.1").with_port(9000))
        .await
        .unwrap();
    assert_eq!(client.own_id().as_deref(), Some(id.as_str()));

    let mut patch = HashMap::new();
    patch.insert("role".to_string(), "edge".to_string());
    assert!(client.update_metadata(patch).await);

    let record = client.get_service(&id).await.unwrap();
    assert_eq!(record.metadata.get("role").map(String::as_str), Some("edge"));

    let found = client.discover("gateway", &DiscoverOptions::new()).await;
    assert_eq!(found.len(), 1);

    assert!(client.deregister().await);
    assert!(client.own_id().is_none());
    assert!(storage.get_service(&id).await.unwrap().is_none());
    assert!(!client.registry().is_monitoring());
}
