//! Client wrapper that injects failures and latency, for tests and drills.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Ref, ResourceKind};
use tokio::sync::RwLock;

use crate::client::ResourceBookingClient;
use crate::confirmation::Confirmation;
use crate::error::{ResourceError, Result};
use crate::requests::BookingRequest;

#[derive(Debug, Default)]
struct FaultState {
    fail_on_book: Option<ResourceError>,
    fail_after_book: bool,
    fail_on_get: Option<ResourceError>,
    fail_on_cancel: Option<ResourceError>,
    book_delay: Duration,
    cancel_delay: Duration,
    book_calls: usize,
    get_calls: usize,
    cancel_calls: usize,
}

/// Wraps another client and fails or delays calls on demand.
///
/// Counts every call that reaches the wrapper, including failed ones.
#[derive(Clone)]
pub struct FaultInjectingClient<C> {
    inner: C,
    state: Arc<RwLock<FaultState>>,
}

impl<C: ResourceBookingClient> FaultInjectingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            state: Arc::default(),
        }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Makes `book` fail with `error` without reaching the wrapped client.
    pub async fn set_fail_on_book(&self, error: Option<ResourceError>) {
        self.state.write().await.fail_on_book = error;
    }

    /// Makes `book` succeed on the wrapped client but report `Unavailable`,
    /// as if the response was lost in transit.
    pub async fn set_fail_after_book(&self, fail: bool) {
        self.state.write().await.fail_after_book = fail;
    }

    pub async fn set_fail_on_get(&self, error: Option<ResourceError>) {
        self.state.write().await.fail_on_get = error;
    }

    pub async fn set_fail_on_cancel(&self, error: Option<ResourceError>) {
        self.state.write().await.fail_on_cancel = error;
    }

    /// Delays every `book` call by `delay` before doing anything.
    pub async fn set_book_delay(&self, delay: Duration) {
        self.state.write().await.book_delay = delay;
    }

    pub async fn set_cancel_delay(&self, delay: Duration) {
        self.state.write().await.cancel_delay = delay;
    }

    pub async fn book_calls(&self) -> usize {
        self.state.read().await.book_calls
    }

    pub async fn get_calls(&self) -> usize {
        self.state.read().await.get_calls
    }

    pub async fn cancel_calls(&self) -> usize {
        self.state.read().await.cancel_calls
    }
}

#[async_trait]
impl<C: ResourceBookingClient> ResourceBookingClient for FaultInjectingClient<C> {
    fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    async fn book(&self, booking_ref: &Ref, request: &BookingRequest) -> Result<Confirmation> {
        let (failure, fail_after, delay) = {
            let mut state = self.state.write().await;
            state.book_calls += 1;
            (
                state.fail_on_book.clone(),
                state.fail_after_book,
                state.book_delay,
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        let confirmation = self.inner.book(booking_ref, request).await?;
        if fail_after {
            return Err(ResourceError::Unavailable(format!(
                "connection reset after booking {}",
                confirmation.booking_ref
            )));
        }
        Ok(confirmation)
    }

    async fn get(&self, booking_ref: &Ref) -> Result<Confirmation> {
        let failure = {
            let mut state = self.state.write().await;
            state.get_calls += 1;
            state.fail_on_get.clone()
        };
        match failure {
            Some(error) => Err(error),
            None => self.inner.get(booking_ref).await,
        }
    }

    async fn cancel(&self, booking_ref: &Ref) -> Result<()> {
        let (failure, delay) = {
            let mut state = self.state.write().await;
            state.cancel_calls += 1;
            (state.fail_on_cancel.clone(), state.cancel_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => self.inner.cancel(booking_ref).await,
        }
    }
}
