//! SQLite integration tests
//!
//! These run against the connection-scoped provider, mostly with the
//! ephemeral in-memory target.
//!
//! ```bash
//! cargo test -p saga-store --test sqlite_integration
//! ```

use std::sync::Arc;

use saga_store::{
    ConnectionProvider, CorrelationId, SagaRecord, SagaRepository, SagaStore,
    SqliteSagaRepository, StoreError, Version,
};

async fn ephemeral_store() -> SagaStore<SqliteSagaRepository> {
    let provider = Arc::new(ConnectionProvider::ephemeral());
    let repo = SqliteSagaRepository::open(provider).await.unwrap();
    SagaStore::new(repo, "Initial")
}

#[tokio::test]
async fn data_does_not_outlive_the_provider() {
    let store = ephemeral_store().await;
    let id = CorrelationId::new();

    let mut record = store.get_or_create(id).await.unwrap();
    record.current_state = "Active".to_string();
    store.save(&mut record).await.unwrap();
    assert!(store.get(id).await.is_ok());

    store.repository().provider().close().await.unwrap();

    let reopened = ephemeral_store().await;
    let result = reopened.get(id).await;
    assert!(matches!(result, Err(StoreError::NotFound(missing)) if missing == id));
}

#[tokio::test]
async fn data_survives_across_sessions_while_provider_lives() {
    let provider = Arc::new(ConnectionProvider::ephemeral());
    let writer = SqliteSagaRepository::open(provider.clone()).await.unwrap();
    let reader = SqliteSagaRepository::new(provider.clone());

    let id = CorrelationId::new();
    let mut record = SagaRecord::new(id, "Active");
    record.user_name = Some("carol".to_string());
    writer.put(&record).await.unwrap();

    let stored = reader.get(id).await.unwrap();
    assert_eq!(stored.user_name.as_deref(), Some("carol"));
}

#[tokio::test]
async fn durable_target_survives_provider_restart() {
    let path = std::env::temp_dir().join(format!("saga-store-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());
    let id = CorrelationId::new();

    {
        let provider = Arc::new(ConnectionProvider::new(url.clone()));
        let repo = SqliteSagaRepository::open(provider.clone()).await.unwrap();
        repo.put(&SagaRecord::new(id, "Ordered")).await.unwrap();
        provider.close().await.unwrap();
    }

    let provider = Arc::new(ConnectionProvider::new(url));
    let repo = SqliteSagaRepository::open(provider.clone()).await.unwrap();
    let stored = repo.get(id).await.unwrap();
    assert_eq!(stored.current_state, "Ordered");
    assert_eq!(stored.version, Version::first());

    provider.close().await.unwrap();
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn concurrent_stale_saves_exactly_one_wins() {
    let store = Arc::new(ephemeral_store().await);
    let id = CorrelationId::new();
    let mut seed = store.get_or_create(id).await.unwrap();
    store.save(&mut seed).await.unwrap();

    let a = store.get(id).await.unwrap();
    let b = store.get(id).await.unwrap();

    let handles: Vec<_> = [(a, "Ordered"), (b, "Expired")]
        .into_iter()
        .map(|(mut record, state)| {
            let store = store.clone();
            tokio::spawn(async move {
                record.current_state = state.to_string();
                store.save(&mut record).await
            })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => successes += 1,
            Err(StoreError::ConcurrencyConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(store.get(id).await.unwrap().version, Version::new(2));
}

#[tokio::test]
async fn concurrent_writers_on_distinct_ids_stay_isolated() {
    let store = Arc::new(ephemeral_store().await);
    let ids: Vec<CorrelationId> = (0..16).map(|_| CorrelationId::new()).collect();

    let handles: Vec<_> = ids
        .iter()
        .copied()
        .enumerate()
        .map(|(i, id)| {
            let store = store.clone();
            tokio::spawn(async move {
                for step in 0..5 {
                    let _guard = store.lock(id).await;
                    let mut record = store.get_or_create(id).await.unwrap();
                    record.current_state = format!("s{i}-{step}");
                    store.save(&mut record).await.unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    for (i, id) in ids.iter().enumerate() {
        let record = store.get(*id).await.unwrap();
        assert_eq!(record.current_state, format!("s{i}-4"));
        assert_eq!(record.version, Version::new(5));
    }
}

#[tokio::test]
async fn missing_instance_is_distinguished_from_unavailable_storage() {
    let store = ephemeral_store().await;
    let id = CorrelationId::new();

    assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));

    store.repository().provider().close().await.unwrap();
    assert!(matches!(
        store.get(id).await,
        Err(StoreError::StorageUnavailable(_))
    ));
}
