use crate::domain::model::AuditRecord;
use crate::domain::ports::AuditStore;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// 以 request id 去重的審計寫入。
///
/// 同一個 id 的檢查與寫入在該 id 專屬的鎖內完成；不同 id 互不等待。
pub struct AuditRecorder<S: AuditStore> {
    store: S,
    in_flight: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S: AuditStore> AuditRecorder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 回傳是否真的新增了一筆；重複的 id 直接略過
    pub async fn record(&self, entry: AuditRecord) -> Result<bool> {
        let request_id = entry.request_id;
        let id_lock = self.in_flight.lock().await.entry(request_id).or_default().clone();

        let result = {
            let _guard = id_lock.lock().await;
            self.write_once(entry).await
        };

        // 沒有其他人在等這個 id 時才移除（map 與本地各持一份）
        let mut in_flight = self.in_flight.lock().await;
        if Arc::strong_count(&id_lock) == 2 {
            in_flight.remove(&request_id);
        }

        result
    }

    async fn write_once(&self, entry: AuditRecord) -> Result<bool> {
        if self.store.exists_by_id(entry.request_id).await? {
            tracing::debug!("Audit record {} already stored, skipping", entry.request_id);
            return Ok(false);
        }

        let request_id = entry.request_id;
        self.store.save(entry).await?;
        tracing::debug!("Audit record {} stored", request_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryAuditStore;
    use crate::utils::error::GatewayError;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn audit_record(request_id: Uuid) -> AuditRecord {
        AuditRecord {
            request_id,
            request_uri: "/".to_string(),
            lookup_uri: None,
            request_timestamp: Utc::now(),
            response_status_code: 200,
            caller_ip: "127.0.0.1".to_string(),
            country_code: None,
            isp_name: None,
            elapsed_millis: 3,
        }
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let recorder = AuditRecorder::new(InMemoryAuditStore::new());
        let id = Uuid::new_v4();

        assert!(recorder.record(audit_record(id)).await.unwrap());

        let mut redelivered = audit_record(id);
        redelivered.response_status_code = 500;
        assert!(!recorder.record(redelivered).await.unwrap());

        let records = recorder.store().records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response_status_code, 200);
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_stores_once() {
        let recorder = Arc::new(AuditRecorder::new(InMemoryAuditStore::new()));
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let recorder = recorder.clone();
                tokio::spawn(async move { recorder.record(audit_record(id)).await.unwrap() })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(recorder.store().len().await, 1);
    }

    /// 寫入時會讓出執行權的 store，用來檢查檢查與寫入之間不會插隊
    struct SlowStore {
        inner: InMemoryAuditStore,
        saves: AtomicUsize,
    }

    impl AuditStore for SlowStore {
        async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
            tokio::task::yield_now().await;
            self.inner.exists_by_id(id).await
        }

        async fn save(&self, record: AuditRecord) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(record).await
        }
    }

    #[tokio::test]
    async fn test_check_and_save_are_atomic() {
        let recorder = Arc::new(AuditRecorder::new(SlowStore {
            inner: InMemoryAuditStore::new(),
            saves: AtomicUsize::new(0),
        }));
        let id = Uuid::new_v4();

        let first = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.record(audit_record(id)).await })
        };
        let second = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.record(audit_record(id)).await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(recorder.store().saves.load(Ordering::SeqCst), 1);
        assert!(recorder.in_flight.lock().await.is_empty());
    }

    /// 兩筆寫入都到齊才放行的 store；若不同 id 互相等待就會卡住
    struct RendezvousStore {
        inner: InMemoryAuditStore,
        barrier: tokio::sync::Barrier,
    }

    impl AuditStore for RendezvousStore {
        async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
            self.inner.exists_by_id(id).await
        }

        async fn save(&self, record: AuditRecord) -> Result<()> {
            self.barrier.wait().await;
            self.inner.save(record).await
        }
    }

    #[tokio::test]
    async fn test_distinct_ids_are_written_concurrently() {
        let recorder = Arc::new(AuditRecorder::new(RendezvousStore {
            inner: InMemoryAuditStore::new(),
            barrier: tokio::sync::Barrier::new(2),
        }));

        let writes: Vec<_> = (0..2)
            .map(|_| {
                let recorder = recorder.clone();
                tokio::spawn(async move { recorder.record(audit_record(Uuid::new_v4())).await })
            })
            .collect();

        let joined = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            for write in writes {
                assert!(write.await.unwrap().unwrap());
            }
        })
        .await;

        assert!(joined.is_ok(), "writes for different ids blocked each other");
        assert_eq!(recorder.store().inner.len().await, 2);
        assert!(recorder.in_flight.lock().await.is_empty());
    }

    struct FailingStore;

    impl AuditStore for FailingStore {
        async fn exists_by_id(&self, _id: Uuid) -> Result<bool> {
            Ok(false)
        }

        async fn save(&self, _record: AuditRecord) -> Result<()> {
            Err(GatewayError::AuditStoreError {
                message: "disk full".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_returned() {
        let recorder = AuditRecorder::new(FailingStore);
        let err = recorder.record(audit_record(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuditStoreError { .. }));
    }
}
