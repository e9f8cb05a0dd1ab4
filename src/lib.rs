//! Flare Discovery Core Library
//!
//! Service registry with heartbeats and health checks, a discovery client with
//! client-side load balancing, and named circuit breakers. Service records are
//! shared between processes through a pluggable storage backend (in-memory,
//! Redis or etcd).

pub mod breaker;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod registry;
pub mod storage;

pub(crate) mod events;

// Re-exports
pub use breaker::{
    BreakerError, BreakerEvent, BreakerMetrics, BreakerObserver, BreakerOptions, CallMetrics,
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, FailureKind,
};
pub use config::{
    BreakerSection, Config, LogFormat, LoggingConfig, RegistryConfig, StorageBackend,
    StorageConfig,
};
pub use discovery::{DiscoveryClient, InstanceQuery, LoadBalanceStrategy, LoadBalancer};
pub use error::{DiscoveryError, Result, StorageError, StorageResult};
pub use logging::init_logging;
pub use registry::{
    DiscoverOptions, RegistryEvent, ServiceRecord, ServiceRegistration, ServiceRegistry,
    ServiceStatus,
};
pub use storage::{MemoryStorage, ServiceStorage, create_storage};
