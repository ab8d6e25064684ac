use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Result, StoredRecord, Versioned, WritePrecondition, WriteResult};

/// Core trait for confirmation store implementations.
///
/// Records are addressed by `(table, key)`. All implementations must be
/// thread-safe and must guarantee that at most one concurrent
/// `WritePrecondition::DoesNotExist` write for the same address succeeds.
#[async_trait]
pub trait ConfirmationStore: Send + Sync {
    /// Reads a record. Expired records are reported as absent.
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>>;

    /// Writes a record if `precondition` holds.
    ///
    /// A failed precondition is reported through `WriteResult`, not as an
    /// error. `ttl`, when set, makes the record expire after that long.
    async fn put(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
        precondition: WritePrecondition,
        ttl: Option<Duration>,
    ) -> Result<WriteResult>;

    /// Removes a record. Returns true if something was removed.
    async fn delete(&self, table: &str, key: &str) -> Result<bool>;
}

#[async_trait]
impl<S: ConfirmationStore + ?Sized> ConfirmationStore for Arc<S> {
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>> {
        (**self).get(table, key).await
    }

    async fn put(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
        precondition: WritePrecondition,
        ttl: Option<Duration>,
    ) -> Result<WriteResult> {
        (**self).put(table, key, payload, precondition, ttl).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool> {
        (**self).delete(table, key).await
    }
}

/// Extension trait providing typed JSON helpers for confirmation stores.
#[async_trait]
pub trait ConfirmationStoreExt: ConfirmationStore {
    /// Reads and deserializes a record.
    async fn get_json<T>(&self, table: &str, key: &str) -> Result<Option<Versioned<T>>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(table, key).await? {
            Some(record) => Ok(Some(Versioned {
                value: serde_json::from_value(record.payload)?,
                version: record.version,
            })),
            None => Ok(None),
        }
    }

    /// Serializes and writes a record.
    async fn put_json<T>(
        &self,
        table: &str,
        key: &str,
        value: &T,
        precondition: WritePrecondition,
        ttl: Option<Duration>,
    ) -> Result<WriteResult>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_value(value)?;
        self.put(table, key, payload, precondition, ttl).await
    }

    /// Returns true if an unexpired record exists.
    async fn exists(&self, table: &str, key: &str) -> Result<bool> {
        Ok(self.get(table, key).await?.is_some())
    }
}

// Blanket implementation for all ConfirmationStore implementations
impl<T: ConfirmationStore + ?Sized> ConfirmationStoreExt for T {}
