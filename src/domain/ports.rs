use crate::config::toml_config::ValidationConfig;
use crate::domain::model::{AuditRecord, ReputationVerdict};
use crate::utils::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// 審計記錄的持久化介面
pub trait AuditStore: Send + Sync {
    fn exists_by_id(&self, id: Uuid) -> impl std::future::Future<Output = Result<bool>> + Send;
    fn save(&self, record: AuditRecord) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait ReputationCheck: Send + Sync {
    async fn check(&self, ip_address: &str, policy: &ValidationConfig)
        -> Result<ReputationVerdict>;
}
