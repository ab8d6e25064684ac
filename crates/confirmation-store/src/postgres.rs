use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::record::expiry_from;
use crate::{ConfirmationStore, Result, StoredRecord, Version, WritePrecondition, WriteResult};

/// PostgreSQL-backed confirmation store implementation.
///
/// All records live in a single `confirmation_records` table partitioned by
/// `(table_name, ref)`.
#[derive(Clone)]
pub struct PostgresConfirmationStore {
    pool: PgPool,
}

impl PostgresConfirmationStore {
    /// Creates a new PostgreSQL confirmation store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            table: row.try_get("table_name")?,
            key: row.try_get("ref")?,
            payload: row.try_get("payload")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    async fn current_version(&self, table: &str, key: &str) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT version FROM confirmation_records
            WHERE table_name = $1 AND ref = $2
              AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(table)
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(Version::new))
    }
}

#[async_trait]
impl ConfirmationStore for PostgresConfirmationStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT table_name, ref, payload, version, created_at, updated_at, expires_at
            FROM confirmation_records
            WHERE table_name = $1 AND ref = $2
              AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(table)
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    #[tracing::instrument(skip(self, payload), fields(store = "postgres"))]
    async fn put(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
        precondition: WritePrecondition,
        ttl: Option<Duration>,
    ) -> Result<WriteResult> {
        let now = Utc::now();
        let expires_at = expiry_from(now, ttl);

        let written: Option<i64> = match precondition {
            // An expired row is replaced in place; a live one blocks the insert.
            WritePrecondition::DoesNotExist => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO confirmation_records
                        (table_name, ref, payload, version, created_at, updated_at, expires_at)
                    VALUES ($1, $2, $3, 1, $4, $4, $5)
                    ON CONFLICT (table_name, ref) DO UPDATE
                    SET payload = EXCLUDED.payload,
                        version = confirmation_records.version + 1,
                        created_at = EXCLUDED.created_at,
                        updated_at = EXCLUDED.updated_at,
                        expires_at = EXCLUDED.expires_at
                    WHERE confirmation_records.expires_at IS NOT NULL
                      AND confirmation_records.expires_at <= $4
                    RETURNING version
                    "#,
                )
                .bind(table)
                .bind(key)
                .bind(&payload)
                .bind(now)
                .bind(expires_at)
                .fetch_optional(&self.pool)
                .await?
            }
            WritePrecondition::MatchesVersion(expected) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE confirmation_records
                    SET payload = $3, version = version + 1, updated_at = $5, expires_at = $6
                    WHERE table_name = $1 AND ref = $2 AND version = $4
                      AND (expires_at IS NULL OR expires_at > $5)
                    RETURNING version
                    "#,
                )
                .bind(table)
                .bind(key)
                .bind(&payload)
                .bind(expected.as_i64())
                .bind(now)
                .bind(expires_at)
                .fetch_optional(&self.pool)
                .await?
            }
            WritePrecondition::None => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO confirmation_records
                        (table_name, ref, payload, version, created_at, updated_at, expires_at)
                    VALUES ($1, $2, $3, 1, $4, $4, $5)
                    ON CONFLICT (table_name, ref) DO UPDATE
                    SET payload = EXCLUDED.payload,
                        version = confirmation_records.version + 1,
                        updated_at = EXCLUDED.updated_at,
                        expires_at = EXCLUDED.expires_at
                    RETURNING version
                    "#,
                )
                .bind(table)
                .bind(key)
                .bind(&payload)
                .bind(now)
                .bind(expires_at)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match written {
            Some(version) => Ok(WriteResult::Success {
                version: Version::new(version),
            }),
            None => {
                tracing::debug!(%table, %key, "write precondition failed");
                Ok(WriteResult::PreconditionFailed {
                    current_version: self.current_version(table, key).await?,
                })
            }
        }
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM confirmation_records WHERE table_name = $1 AND ref = $2")
                .bind(table)
                .bind(key)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
