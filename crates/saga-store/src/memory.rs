use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    CorrelationId, Result, SagaRecord, StoreError, Version, record::validate_record,
    store::SagaRepository,
};

/// In-memory saga repository implementation for testing.
///
/// This implementation stores all records in memory and provides
/// the same interface as the SQLite implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaRepository {
    records: Arc<RwLock<HashMap<CorrelationId, SagaRecord>>>,
}

impl InMemorySagaRepository {
    /// Creates a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    async fn get(&self, correlation_id: CorrelationId) -> Result<SagaRecord> {
        let records = self.records.read().await;
        records
            .get(&correlation_id)
            .cloned()
            .ok_or(StoreError::NotFound(correlation_id))
    }

    async fn put(&self, record: &SagaRecord) -> Result<Version> {
        validate_record(record).map_err(|e| StoreError::InvalidRecord(e.message))?;

        let correlation_id = record.correlation_id;
        let expected = record.version;

        let mut records = self.records.write().await;

        let current_version = records
            .get(&correlation_id)
            .map(|r| r.version)
            .unwrap_or(Version::initial());

        if current_version != expected {
            return Err(StoreError::ConcurrencyConflict {
                correlation_id,
                expected,
                actual: current_version,
            });
        }

        let new_version = expected.next();
        let mut stored = record.clone();
        stored.version = new_version;
        records.insert(correlation_id, stored);

        Ok(new_version)
    }

    async fn delete(&self, correlation_id: CorrelationId, expected: Version) -> Result<()> {
        let mut records = self.records.write().await;

        let actual = records
            .get(&correlation_id)
            .map(|r| r.version)
            .ok_or(StoreError::NotFound(correlation_id))?;

        if actual != expected {
            return Err(StoreError::ConcurrencyConflict {
                correlation_id,
                expected,
                actual,
            });
        }

        records.remove(&correlation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(correlation_id: CorrelationId) -> SagaRecord {
        let mut record = SagaRecord::new(correlation_id, "Active");
        record.user_name = Some("alice".to_string());
        record
    }

    #[tokio::test]
    async fn put_new_record() {
        let repo = InMemorySagaRepository::new();
        let id = CorrelationId::new();

        let version = repo.put(&create_test_record(id)).await.unwrap();
        assert_eq!(version, Version::first());

        let stored = repo.get(id).await.unwrap();
        assert_eq!(stored.version, Version::first());
        assert_eq!(stored.user_name.as_deref(), Some("alice"));
        assert_eq!(repo.record_count().await, 1);
    }

    #[tokio::test]
    async fn put_with_loaded_version_succeeds() {
        let repo = InMemorySagaRepository::new();
        let id = CorrelationId::new();
        repo.put(&create_test_record(id)).await.unwrap();

        let mut loaded = repo.get(id).await.unwrap();
        loaded.current_state = "Ordered".to_string();
        let version = repo.put(&loaded).await.unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(repo.get(id).await.unwrap().current_state, "Ordered");
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let repo = InMemorySagaRepository::new();
        let id = CorrelationId::new();
        repo.put(&create_test_record(id)).await.unwrap();

        let first = repo.get(id).await.unwrap();
        let second = repo.get(id).await.unwrap();

        repo.put(&first).await.unwrap();
        let result = repo.put(&second).await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::first() && actual == Version::new(2)
        ));
    }

    #[tokio::test]
    async fn creating_an_existing_record_conflicts() {
        let repo = InMemorySagaRepository::new();
        let id = CorrelationId::new();
        repo.put(&create_test_record(id)).await.unwrap();

        let result = repo.put(&create_test_record(id)).await;
        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn get_missing_record_is_not_found() {
        let repo = InMemorySagaRepository::new();
        let id = CorrelationId::new();

        let result = repo.get(id).await;
        assert!(matches!(result, Err(StoreError::NotFound(missing)) if missing == id));
        assert_eq!(repo.record_count().await, 0);
    }

    #[tokio::test]
    async fn delete_checks_version() {
        let repo = InMemorySagaRepository::new();
        let id = CorrelationId::new();
        repo.put(&create_test_record(id)).await.unwrap();

        let stale = repo.delete(id, Version::new(7)).await;
        assert!(stale.unwrap_err().is_conflict());

        repo.delete(id, Version::first()).await.unwrap();
        assert!(repo.get(id).await.unwrap_err().is_not_found());

        let missing = repo.delete(id, Version::first()).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn put_rejects_invalid_record() {
        let repo = InMemorySagaRepository::new();
        let mut record = create_test_record(CorrelationId::new());
        record.current_state = "s".repeat(crate::MAX_STATE_LEN + 1);

        let result = repo.put(&record).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert_eq!(repo.record_count().await, 0);
    }
}
