use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, sqlite::SqliteRow};
use uuid::Uuid;

use crate::{
    ConnectionProvider, CorrelationId, Result, SagaRecord, StoreError, Version,
    provider::ConnectionGuard, record::validate_record, store::SagaRepository,
};

/// Schema for the saga record table.
pub const CREATE_SAGA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS shopping_cart (
    correlation_id TEXT PRIMARY KEY NOT NULL,
    current_state TEXT NOT NULL CHECK (length(current_state) <= 80),
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    user_name TEXT,
    expiration_id TEXT,
    order_id TEXT,
    version INTEGER NOT NULL
)
"#;

/// SQLite-backed saga repository.
///
/// Every operation opens a logical session on the shared provider, so the
/// repository itself holds no connection.
#[derive(Clone)]
pub struct SqliteSagaRepository {
    provider: Arc<ConnectionProvider>,
}

impl SqliteSagaRepository {
    /// Creates a repository over the provider without touching the schema.
    pub fn new(provider: Arc<ConnectionProvider>) -> Self {
        Self { provider }
    }

    /// Opens the provider, creates the schema if missing and returns the
    /// repository.
    pub async fn open(provider: Arc<ConnectionProvider>) -> Result<Self> {
        let repo = Self::new(provider);
        repo.init().await?;
        Ok(repo)
    }

    /// Gets a reference to the underlying provider.
    pub fn provider(&self) -> &Arc<ConnectionProvider> {
        &self.provider
    }

    /// Creates the saga table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        let session = self.provider.open_session().await?;
        let mut conn = session.acquire().await?;
        sqlx::query(CREATE_SAGA_TABLE).execute(&mut *conn).await?;
        Ok(())
    }

    fn row_to_record(row: SqliteRow) -> Result<SagaRecord> {
        Ok(SagaRecord {
            correlation_id: CorrelationId::from_uuid(parse_uuid(
                row.try_get::<String, _>("correlation_id")?,
            )?),
            current_state: row.try_get("current_state")?,
            created: row.try_get::<DateTime<Utc>, _>("created")?,
            updated: row.try_get::<DateTime<Utc>, _>("updated")?,
            user_name: row.try_get("user_name")?,
            expiration_id: row
                .try_get::<Option<String>, _>("expiration_id")?
                .map(parse_uuid)
                .transpose()?,
            order_id: row
                .try_get::<Option<String>, _>("order_id")?
                .map(parse_uuid)
                .transpose()?,
            version: Version::new(row.try_get("version")?),
        })
    }

    async fn current_version(
        conn: &mut ConnectionGuard<'_>,
        correlation_id: CorrelationId,
    ) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM shopping_cart WHERE correlation_id = ?")
                .bind(correlation_id.to_string())
                .fetch_optional(&mut **conn)
                .await?;
        Ok(version.map(Version::new))
    }
}

fn parse_uuid(value: String) -> Result<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|e| StoreError::InvalidRecord(format!("malformed uuid '{value}': {e}")))
}

#[async_trait]
impl SagaRepository for SqliteSagaRepository {
    #[tracing::instrument(skip(self))]
    async fn get(&self, correlation_id: CorrelationId) -> Result<SagaRecord> {
        let session = self.provider.open_session().await?;
        let mut conn = session.acquire().await?;

        let row: Option<SqliteRow> = sqlx::query(
            r#"
            SELECT correlation_id, current_state, created, updated,
                   user_name, expiration_id, order_id, version
            FROM shopping_cart
            WHERE correlation_id = ?
            "#,
        )
        .bind(correlation_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(StoreError::NotFound(correlation_id)),
        }
    }

    #[tracing::instrument(skip(self, record), fields(correlation_id = %record.correlation_id, expected = %record.version))]
    async fn put(&self, record: &SagaRecord) -> Result<Version> {
        validate_record(record).map_err(|e| StoreError::InvalidRecord(e.message))?;

        let correlation_id = record.correlation_id;
        let expected = record.version;
        let new_version = expected.next();

        let session = self.provider.open_session().await?;
        let mut conn = session.acquire().await?;

        if expected == Version::initial() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO shopping_cart
                    (correlation_id, current_state, created, updated,
                     user_name, expiration_id, order_id, version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(correlation_id.to_string())
            .bind(&record.current_state)
            .bind(record.created)
            .bind(record.updated)
            .bind(&record.user_name)
            .bind(record.expiration_id.map(|id| id.to_string()))
            .bind(record.order_id.map(|id| id.to_string()))
            .bind(new_version.as_i64())
            .execute(&mut *conn)
            .await;

            return match inserted {
                Ok(_) => Ok(new_version),
                Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                    let actual = Self::current_version(&mut conn, correlation_id)
                        .await?
                        .unwrap_or(Version::initial());
                    Err(StoreError::ConcurrencyConflict {
                        correlation_id,
                        expected,
                        actual,
                    })
                }
                Err(e) => Err(StoreError::Database(e)),
            };
        }

        let updated = sqlx::query(
            r#"
            UPDATE shopping_cart
            SET current_state = ?, updated = ?, user_name = ?,
                expiration_id = ?, order_id = ?, version = ?
            WHERE correlation_id = ? AND version = ?
            "#,
        )
        .bind(&record.current_state)
        .bind(record.updated)
        .bind(&record.user_name)
        .bind(record.expiration_id.map(|id| id.to_string()))
        .bind(record.order_id.map(|id| id.to_string()))
        .bind(new_version.as_i64())
        .bind(correlation_id.to_string())
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            let actual = Self::current_version(&mut conn, correlation_id)
                .await?
                .unwrap_or(Version::initial());
            return Err(StoreError::ConcurrencyConflict {
                correlation_id,
                expected,
                actual,
            });
        }

        Ok(new_version)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, correlation_id: CorrelationId, expected: Version) -> Result<()> {
        let session = self.provider.open_session().await?;
        let mut conn = session.acquire().await?;

        let deleted =
            sqlx::query("DELETE FROM shopping_cart WHERE correlation_id = ? AND version = ?")
                .bind(correlation_id.to_string())
                .bind(expected.as_i64())
                .execute(&mut *conn)
                .await?;

        if deleted.rows_affected() == 0 {
            return match Self::current_version(&mut conn, correlation_id).await? {
                Some(actual) => Err(StoreError::ConcurrencyConflict {
                    correlation_id,
                    expected,
                    actual,
                }),
                None => Err(StoreError::NotFound(correlation_id)),
            };
        }

        Ok(())
    }
}
