use async_trait::async_trait;

use crate::{CorrelationId, Result, SagaRecord, Version};

/// Core trait for saga record storage.
///
/// A repository persists one record per correlation id and guards every
/// write with an optimistic version check. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait SagaRepository: Send + Sync {
    /// Retrieves the record for a correlation id.
    ///
    /// Returns `StoreError::NotFound` if no record exists.
    async fn get(&self, correlation_id: CorrelationId) -> Result<SagaRecord>;

    /// Writes the full record.
    ///
    /// `record.version` is the version the caller loaded; version 0 means the
    /// record must not exist yet. Fails with `ConcurrencyConflict` if the stored
    /// version differs. Returns the new version.
    async fn put(&self, record: &SagaRecord) -> Result<Version>;

    /// Deletes the record if it is still at `expected`.
    ///
    /// Fails with `NotFound` if absent and `ConcurrencyConflict` if the stored
    /// version differs.
    async fn delete(&self, correlation_id: CorrelationId, expected: Version) -> Result<()>;
}
