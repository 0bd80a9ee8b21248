//! Correlation-keyed saga persistence.
//!
//! [`ConnectionProvider`] keeps one physical SQLite connection alive and
//! multiplexes logical sessions onto it, which is what lets an in-memory
//! database hold its data across sessions. [`SqliteSagaRepository`] and
//! [`InMemorySagaRepository`] implement [`SagaRepository`]; [`SagaStore`]
//! adds load-or-create, optimistic save and per-id locking on top.

pub mod error;
pub mod lock;
pub mod memory;
pub mod provider;
pub mod record;
pub mod saga_store;
pub mod sqlite;
pub mod store;

pub use common::CorrelationId;
pub use error::{Result, StoreError};
pub use lock::{KeyGuard, KeyedLock};
pub use memory::InMemorySagaRepository;
pub use provider::{ConnectionProvider, EPHEMERAL_URL, Session};
pub use record::{MAX_STATE_LEN, SagaRecord, Version};
pub use saga_store::SagaStore;
pub use sqlite::SqliteSagaRepository;
pub use store::SagaRepository;
