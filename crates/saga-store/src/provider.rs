//! Single-connection storage provider.
//!
//! An in-memory SQLite database lives exactly as long as its connection. The
//! provider therefore opens one physical connection lazily, hands out any
//! number of logical [`Session`]s that all share it, and closes it exactly
//! once. Every statement on any session is serialized through the handle's
//! mutex, since SQLite does not tolerate interleaved statements on one
//! connection.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::{Result, StoreError};

/// Connection target for an ephemeral, connection-scoped database.
pub const EPHEMERAL_URL: &str = "sqlite::memory:";

/// Owns the single physical connection for a storage target.
///
/// Construction does not connect; the first [`open`](Self::open) or
/// [`open_session`](Self::open_session) does. A failed connect leaves the
/// provider permanently unusable.
pub struct ConnectionProvider {
    url: String,
    state: Mutex<ProviderState>,
}

enum ProviderState {
    Unopened,
    Open(Arc<LiveConnection>),
    Failed(String),
    Closed,
}

/// The physical handle. `None` once the provider has closed it.
struct LiveConnection {
    conn: Mutex<Option<SqliteConnection>>,
}

/// A logical session bound to the provider's one physical connection.
///
/// Sessions are cheap to clone and may be used concurrently; their statements
/// are executed one at a time against the shared handle.
#[derive(Clone)]
pub struct Session {
    handle: Arc<LiveConnection>,
}

/// Exclusive access to the shared connection for the duration of a statement
/// or transaction.
pub type ConnectionGuard<'a> = MappedMutexGuard<'a, SqliteConnection>;

impl ConnectionProvider {
    /// Creates a provider for the given SQLite URL without connecting.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(ProviderState::Unopened),
        }
    }

    /// Creates a provider for a fresh ephemeral in-memory database.
    pub fn ephemeral() -> Self {
        Self::new(EPHEMERAL_URL)
    }

    /// Returns true if the target only lives as long as its connection.
    pub fn is_ephemeral(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Establishes the physical connection if it is not open yet.
    ///
    /// Idempotent. Fails with `StorageUnavailable` if the connect fails (the
    /// provider stays failed) or if the provider was closed.
    pub async fn open(&self) -> Result<()> {
        self.live().await.map(|_| ())
    }

    /// Returns a session bound to the shared connection, opening it if needed.
    pub async fn open_session(&self) -> Result<Session> {
        let handle = self.live().await?;
        metrics::counter!("storage_sessions_opened_total").increment(1);
        Ok(Session { handle })
    }

    /// Returns true while the physical connection is open.
    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, ProviderState::Open(_))
    }

    /// Closes the physical connection exactly once.
    ///
    /// Waits for the statement currently holding the connection to finish.
    /// Afterwards every session fails with `StorageUnavailable`. Calling this
    /// again is a no-op.
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let live = match std::mem::replace(&mut *state, ProviderState::Closed) {
            ProviderState::Open(live) => live,
            _ => return Ok(()),
        };

        let conn = live.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await?;
            tracing::info!("storage connection closed");
        }
        Ok(())
    }

    async fn live(&self) -> Result<Arc<LiveConnection>> {
        let mut state = self.state.lock().await;
        match &*state {
            ProviderState::Open(live) => return Ok(live.clone()),
            ProviderState::Failed(reason) => {
                return Err(StoreError::StorageUnavailable(reason.clone()));
            }
            ProviderState::Closed => {
                return Err(StoreError::StorageUnavailable(
                    "storage provider has been closed".to_string(),
                ));
            }
            ProviderState::Unopened => {}
        }

        match connect(&self.url).await {
            Ok(conn) => {
                let live = Arc::new(LiveConnection {
                    conn: Mutex::new(Some(conn)),
                });
                *state = ProviderState::Open(live.clone());
                tracing::info!(url = %self.url, ephemeral = self.is_ephemeral(), "storage connection opened");
                Ok(live)
            }
            Err(e) => {
                let reason = format!("failed to connect to {}: {e}", self.url);
                tracing::error!(url = %self.url, error = %e, "storage connection failed");
                *state = ProviderState::Failed(reason.clone());
                Err(StoreError::StorageUnavailable(reason))
            }
        }
    }
}

async fn connect(url: &str) -> std::result::Result<SqliteConnection, sqlx::Error> {
    SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .connect()
        .await
}

impl Drop for ConnectionProvider {
    fn drop(&mut self) {
        // Without an awaited close, release the handle here. A session still
        // mid-statement keeps it until that statement's guard drops.
        if let ProviderState::Open(live) = self.state.get_mut()
            && let Ok(mut conn) = live.conn.try_lock()
        {
            conn.take();
        }
    }
}

impl Session {
    /// Locks the shared connection for exclusive use.
    ///
    /// Waits behind any statement running on another session. Fails with
    /// `StorageUnavailable` once the provider has closed the connection.
    pub async fn acquire(&self) -> Result<ConnectionGuard<'_>> {
        let guard = self.handle.conn.lock().await;
        MutexGuard::try_map(guard, |conn| conn.as_mut()).map_err(|_| {
            StoreError::StorageUnavailable("storage connection has been closed".to_string())
        })
    }

    /// Returns true if both sessions use the same physical connection.
    pub fn shares_connection_with(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn create_kv(session: &Session) {
        let mut conn = session.acquire().await.unwrap();
        sqlx::query("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT NOT NULL)")
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn open_is_lazy_and_idempotent() {
        let provider = ConnectionProvider::ephemeral();
        assert!(!provider.is_open().await);

        provider.open().await.unwrap();
        provider.open().await.unwrap();
        assert!(provider.is_open().await);
    }

    #[tokio::test]
    async fn sessions_share_one_connection() {
        let provider = ConnectionProvider::ephemeral();
        let a = provider.open_session().await.unwrap();
        let b = provider.open_session().await.unwrap();
        assert!(a.shares_connection_with(&b));
    }

    #[tokio::test]
    async fn sessions_observe_each_others_writes() {
        let provider = ConnectionProvider::ephemeral();
        let a = provider.open_session().await.unwrap();
        let b = provider.open_session().await.unwrap();

        create_kv(&a).await;
        {
            let mut conn = a.acquire().await.unwrap();
            sqlx::query("INSERT INTO kv (k, v) VALUES ('cart', 'active')")
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        let mut conn = b.acquire().await.unwrap();
        let value: String = sqlx::query_scalar("SELECT v FROM kv WHERE k = 'cart'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(value, "active");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_invalidates_sessions() {
        let provider = ConnectionProvider::ephemeral();
        let session = provider.open_session().await.unwrap();

        provider.close().await.unwrap();
        provider.close().await.unwrap();

        assert!(matches!(
            session.acquire().await,
            Err(StoreError::StorageUnavailable(_))
        ));
        assert!(matches!(
            provider.open_session().await,
            Err(StoreError::StorageUnavailable(_))
        ));
        assert!(!provider.is_open().await);
    }

    #[tokio::test]
    async fn failed_connect_is_permanent() {
        let provider = ConnectionProvider::new("sqlite:///nonexistent-dir/for/tests/carts.db");

        assert!(matches!(
            provider.open().await,
            Err(StoreError::StorageUnavailable(_))
        ));
        assert!(matches!(
            provider.open_session().await,
            Err(StoreError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_statement() {
        let provider = Arc::new(ConnectionProvider::ephemeral());
        let session = provider.open_session().await.unwrap();

        let guard = session.acquire().await.unwrap();

        let closer = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.close().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!closer.is_finished());

        drop(guard);
        closer.await.unwrap().unwrap();
        assert!(session.acquire().await.is_err());
    }

    #[test]
    fn ephemeral_detection() {
        assert!(ConnectionProvider::ephemeral().is_ephemeral());
        assert!(ConnectionProvider::new("sqlite:file:carts?mode=memory").is_ephemeral());
        assert!(!ConnectionProvider::new("sqlite://carts.db").is_ephemeral());
    }
}
