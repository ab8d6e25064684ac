use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::record::expiry_from;
use crate::{
    ConfirmationStore, Result, StoreError, StoredRecord, Version, WritePrecondition, WriteResult,
};

type RecordKey = (String, String);

/// In-memory confirmation store implementation for testing.
///
/// Provides the same conditional-write semantics as the PostgreSQL
/// implementation. Writes hold the lock for the whole check-and-set, so
/// create-if-absent is atomic.
///
/// Versions come from one store-wide counter, so a record recreated after
/// expiry or deletion never reuses a version a stale writer may still hold.
/// Expired records are swept on every write.
#[derive(Clone, Default)]
pub struct InMemoryConfirmationStore {
    records: Arc<RwLock<HashMap<RecordKey, StoredRecord>>>,
    last_version: Arc<AtomicI64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryConfirmationStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of unexpired records in `table`.
    pub async fn record_count(&self, table: &str) -> usize {
        let now = Utc::now();
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.table == table && !r.is_expired_at(now))
            .count()
    }

    /// Returns the number of records held, expired or not.
    pub async fn held_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfirmationStore for InMemoryConfirmationStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>> {
        self.check_available()?;
        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records
            .get(&(table.to_string(), key.to_string()))
            .filter(|r| !r.is_expired_at(now))
            .cloned())
    }

    async fn put(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
        precondition: WritePrecondition,
        ttl: Option<Duration>,
    ) -> Result<WriteResult> {
        self.check_available()?;
        let now = Utc::now();
        let expires_at = expiry_from(now, ttl);
        let record_key = (table.to_string(), key.to_string());

        let mut records = self.records.write().await;
        records.retain(|_, r| !r.is_expired_at(now));
        let existing = records.get(&record_key);
        let current_version = existing.map(|r| r.version);

        let applies = match precondition {
            WritePrecondition::DoesNotExist => existing.is_none(),
            WritePrecondition::MatchesVersion(expected) => current_version == Some(expected),
            WritePrecondition::None => true,
        };
        if !applies {
            return Ok(WriteResult::PreconditionFailed { current_version });
        }

        let version = Version::new(self.last_version.fetch_add(1, Ordering::SeqCst) + 1);
        let created_at = existing.map(|r| r.created_at).unwrap_or(now);

        records.insert(
            record_key,
            StoredRecord {
                table: table.to_string(),
                key: key.to_string(),
                payload,
                version,
                created_at,
                updated_at: now,
                expires_at,
            },
        );

        Ok(WriteResult::Success { version })
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool> {
        self.check_available()?;
        let mut records = self.records.write().await;
        Ok(records
            .remove(&(table.to_string(), key.to_string()))
            .is_some())
    }
}
