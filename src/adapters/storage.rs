use crate::domain::model::AuditRecord;
use crate::domain::ports::AuditStore;
use crate::utils::error::{GatewayError, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<HashMap<Uuid, AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依請求時間排序
    pub async fn records(&self) -> Vec<AuditRecord> {
        let records = self.records.read().await;
        let mut all: Vec<AuditRecord> = records.values().cloned().collect();
        all.sort_by_key(|r| r.request_timestamp);
        all
    }

    pub async fn get(&self, id: Uuid) -> Option<AuditRecord> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl AuditStore for InMemoryAuditStore {
    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.read().await.contains_key(&id))
    }

    async fn save(&self, record: AuditRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.entry(record.request_id).or_insert(record);
        Ok(())
    }
}

/// 只附加的 JSON Lines 檔案，每行一筆審計記錄
#[derive(Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    index: Mutex<HashSet<Uuid>>,
}

impl JsonlAuditStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut index = HashSet::new();
        if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            for (number, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: AuditRecord =
                    serde_json::from_str(line).map_err(|e| GatewayError::AuditStoreError {
                        message: format!(
                            "Corrupt audit line {} in {}: {}",
                            number + 1,
                            path.display(),
                            e
                        ),
                    })?;
                index.insert(record.request_id);
            }
        }

        tracing::info!(
            "Audit log {} opened with {} existing record(s)",
            path.display(),
            index.len()
        );

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditStore for JsonlAuditStore {
    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.index.lock().await.contains(&id))
    }

    async fn save(&self, record: AuditRecord) -> Result<()> {
        let mut index = self.index.lock().await;
        if index.contains(&record.request_id) {
            return Ok(());
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        index.insert(record.request_id);
        Ok(())
    }
}

/// 依配置選擇的審計後端
#[derive(Debug)]
pub enum AuditBackendStore {
    Memory(InMemoryAuditStore),
    Jsonl(JsonlAuditStore),
}

impl AuditBackendStore {
    pub async fn from_config(config: &crate::config::toml_config::AuditConfig) -> Result<Self> {
        match config.backend {
            crate::config::AuditBackend::Memory => {
                tracing::warn!("⚠️ In-memory audit backend selected, audit records are lost on restart");
                Ok(Self::Memory(InMemoryAuditStore::new()))
            }
            crate::config::AuditBackend::Jsonl => {
                Ok(Self::Jsonl(JsonlAuditStore::open(&config.path).await?))
            }
        }
    }
}

impl AuditStore for AuditBackendStore {
    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        match self {
            Self::Memory(store) => store.exists_by_id(id).await,
            Self::Jsonl(store) => store.exists_by_id(id).await,
        }
    }

    async fn save(&self, record: AuditRecord) -> Result<()> {
        match self {
            Self::Memory(store) => store.save(record).await,
            Self::Jsonl(store) => store.save(record).await,
        }
    }
}
