//! Resource service backed directly by a confirmation store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{Ref, ResourceKind};
use confirmation_store::{
    ConfirmationStore, ConfirmationStoreExt, Versioned, WritePrecondition, WriteResult,
};

use crate::client::ResourceBookingClient;
use crate::confirmation::{Confirmation, ValidationState};
use crate::error::{ResourceError, Result};
use crate::requests::BookingRequest;
use crate::validation::ValidationEngine;

/// How often a cancel retries after losing a write race.
const CANCEL_ATTEMPTS: usize = 3;

type ValidationLocks = Arc<Mutex<HashMap<Ref, Arc<tokio::sync::Mutex<()>>>>>;

/// Books one resource type into its own table of a `ConfirmationStore`.
///
/// Reads validate pending bookings through the injected `ValidationEngine`.
/// Concurrent reads of the same pending booking share one validation.
#[derive(Clone)]
pub struct StoreBackedClient<S> {
    kind: ResourceKind,
    store: S,
    validator: Arc<dyn ValidationEngine>,
    validation_locks: ValidationLocks,
}

impl<S: ConfirmationStore> StoreBackedClient<S> {
    /// Creates a client for `kind` storing into `store`.
    pub fn new(kind: ResourceKind, store: S, validator: Arc<dyn ValidationEngine>) -> Self {
        Self {
            kind,
            store,
            validator,
            validation_locks: Arc::default(),
        }
    }

    fn table(&self) -> &'static str {
        self.kind.table()
    }

    async fn load(&self, booking_ref: &Ref) -> Result<Versioned<Confirmation>> {
        self.store
            .get_json::<Confirmation>(self.table(), booking_ref.as_str())
            .await?
            .ok_or_else(|| ResourceError::NotFound(booking_ref.clone()))
    }

    fn validation_lock(&self, booking_ref: &Ref) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .validation_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(booking_ref.clone()).or_default().clone()
    }

    fn release_validation_lock(&self, booking_ref: &Ref, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .validation_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference is held by the map, one by us.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(booking_ref);
        }
    }

    async fn validate_pending(&self, booking_ref: &Ref) -> Result<Confirmation> {
        let current = self.load(booking_ref).await?;
        if !current.value.needs_validation() {
            return Ok(current.value);
        }

        let mut updated = current.value.clone();
        match self.validator.validate(&current.value).await {
            Ok(outcome) => updated.apply_validation(outcome),
            Err(e) => {
                tracing::warn!(%booking_ref, kind = %self.kind, error = %e, "validation attempt failed");
                metrics::counter!(
                    "booking_validations_total",
                    "kind" => self.kind.as_str(),
                    "outcome" => "error"
                )
                .increment(1);
                return Ok(current.value);
            }
        }

        let written = self
            .store
            .put_json(
                self.table(),
                booking_ref.as_str(),
                &updated,
                WritePrecondition::MatchesVersion(current.version),
                None,
            )
            .await?;

        match written {
            WriteResult::Success { .. } => {
                metrics::counter!(
                    "booking_validations_total",
                    "kind" => self.kind.as_str(),
                    "outcome" => updated.validation_state.as_str()
                )
                .increment(1);
                tracing::info!(
                    %booking_ref,
                    kind = %self.kind,
                    state = %updated.validation_state,
                    "booking validation recorded"
                );
                Ok(updated)
            }
            // Cancelled (or otherwise changed) underneath us; the stored record wins.
            WriteResult::PreconditionFailed { .. } => Ok(self.load(booking_ref).await?.value),
        }
    }
}

#[async_trait]
impl<S: ConfirmationStore> ResourceBookingClient for StoreBackedClient<S> {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[tracing::instrument(skip(self, request), fields(kind = %self.kind))]
    async fn book(&self, booking_ref: &Ref, request: &BookingRequest) -> Result<Confirmation> {
        if request.kind() != self.kind {
            return Err(ResourceError::InvalidRequest(format!(
                "{} service cannot book {} requests",
                self.kind,
                request.kind()
            )));
        }
        request.validate()?;

        let confirmation = Confirmation::new(booking_ref.clone(), request.clone());
        let written = self
            .store
            .put_json(
                self.table(),
                booking_ref.as_str(),
                &confirmation,
                WritePrecondition::DoesNotExist,
                None,
            )
            .await?;

        match written {
            WriteResult::Success { .. } => {
                tracing::info!("booking recorded");
                Ok(confirmation)
            }
            WriteResult::PreconditionFailed { .. } => {
                let existing = self.load(booking_ref).await?.value;
                if existing.request == *request {
                    tracing::debug!("booking replayed for existing reference");
                    Ok(existing)
                } else {
                    Err(ResourceError::AlreadyExists(booking_ref.clone()))
                }
            }
        }
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn get(&self, booking_ref: &Ref) -> Result<Confirmation> {
        let current = self.load(booking_ref).await?;
        if !current.value.needs_validation() {
            return Ok(current.value);
        }

        let lock = self.validation_lock(booking_ref);
        let result = {
            let _guard = lock.lock().await;
            self.validate_pending(booking_ref).await
        };
        self.release_validation_lock(booking_ref, lock);
        result
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn cancel(&self, booking_ref: &Ref) -> Result<()> {
        for _ in 0..CANCEL_ATTEMPTS {
            let current = self.load(booking_ref).await?;
            if current.value.is_cancelled() {
                return Ok(());
            }
            if current.value.validation_state == ValidationState::Validated {
                return Err(ResourceError::CompensationFailed {
                    booking_ref: booking_ref.clone(),
                    reason: "booking already validated downstream; cancellation is irreversible"
                        .to_string(),
                });
            }

            let mut cancelled = current.value.clone();
            cancelled.cancel();
            let written = self
                .store
                .put_json(
                    self.table(),
                    booking_ref.as_str(),
                    &cancelled,
                    WritePrecondition::MatchesVersion(current.version),
                    None,
                )
                .await?;
            if written.is_success() {
                tracing::info!("booking cancelled");
                return Ok(());
            }
        }

        Err(ResourceError::Unavailable(format!(
            "booking {booking_ref} kept changing while cancelling"
        )))
    }
}
