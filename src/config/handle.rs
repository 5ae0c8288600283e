use crate::config::toml_config::GatewayConfig;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;

/// 可在執行期間替換的配置。每個請求只取一次快照。
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<GatewayConfig>>,
    source: Option<PathBuf>,
}

impl ConfigHandle {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            source: None,
        }
    }

    pub fn with_source(config: GatewayConfig, source: PathBuf) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            source: Some(source),
        }
    }

    pub fn snapshot(&self) -> Arc<GatewayConfig> {
        self.current.load_full()
    }

    /// 驗證通過才替換，失敗時保留舊配置
    pub fn swap(&self, next: GatewayConfig) -> Result<()> {
        next.validate()?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// 重新讀取來源檔案；沒有來源檔案時不做任何事
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = &self.source else {
            return Ok(false);
        };

        let next = GatewayConfig::from_file(path)?;
        let previous = self.snapshot();
        if previous.server.host != next.server.host
            || previous.server.port != next.server.port
            || previous.audit.backend != next.audit.backend
            || previous.audit.path != next.audit.path
        {
            tracing::warn!("server/audit settings changed; they take effect after a restart");
        }

        self.swap(next)?;
        tracing::info!("Configuration reloaded from {}", path.display());
        Ok(true)
    }
}
