pub mod compression;
pub mod config;
pub mod core;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod stores;

// Re-export commonly used types
pub use compression::{CompressionAlgorithm, CompressionConfig, ValueCodec};
pub use config::OrchestratorConfig;
pub use core::{CacheOperation, OperationLog, OperationType, OrchestratorError, Result};
pub use metrics::init_metrics;
pub use orchestrator::alerts::{Alert, AlertSeverity};
pub use orchestrator::cleanup::{CleanupHook, CleanupResult};
pub use orchestrator::health::{CacheHealthStatus, CacheMetricsSnapshot, HealthTier};
pub use orchestrator::invalidation::{InvalidationRequest, InvalidationResult};
pub use orchestrator::prefetch::{LearningProfile, PrefetchResult, SessionSummary};
pub use orchestrator::strategy::{CacheStrategy, InvalidationRule, PrefetchRule, PrefetchTrigger};
pub use orchestrator::warmup::{WarmupJob, WarmupResult};
pub use orchestrator::{CacheOrchestrator, CacheTiers};
pub use server::{AppState, create_router};
pub use stores::{
    BackingStore, ContentStore, LocalCache, LruLocalCache, MemoryBackingStore, SessionStore,
    WarmupSource,
};
