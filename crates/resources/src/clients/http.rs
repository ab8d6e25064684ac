//! Client for a resource booking service reached over HTTP.
//!
//! Each service exposes, under `/{table}/booking`:
//! - `POST ?ref=` with the booking request as JSON, answering `201` and the confirmation
//! - `GET ?ref=`, answering `200` and the confirmation
//! - `POST /cancel?ref=`, answering `204`
//!
//! Errors come back as `{"error": "..."}` bodies.

use std::time::Duration;

use async_trait::async_trait;
use common::{Ref, ResourceKind};
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use crate::client::ResourceBookingClient;
use crate::confirmation::Confirmation;
use crate::error::{ResourceError, Result};
use crate::requests::BookingRequest;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Which call produced a response, for status code mapping.
#[derive(Debug, Clone, Copy)]
enum Call {
    Book,
    Get,
    Cancel,
}

/// `ResourceBookingClient` speaking to a remote booking service.
#[derive(Debug, Clone)]
pub struct HttpResourceClient {
    kind: ResourceKind,
    base_url: String,
    http: reqwest::Client,
}

impl HttpResourceClient {
    /// Creates a client for `kind` at `base_url`, bounding each call by `timeout`.
    pub fn new(kind: ResourceKind, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResourceError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(kind, base_url, http))
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    pub fn with_client(
        kind: ResourceKind,
        base_url: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            kind,
            base_url,
            http,
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}/booking{}", self.base_url, self.kind.table(), suffix)
    }

    async fn error_message(response: Response) -> String {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("unexpected status {status}"),
        }
    }

    async fn map_error(call: Call, booking_ref: &Ref, response: Response) -> ResourceError {
        let status = response.status();
        let message = Self::error_message(response).await;
        match (status, call) {
            (StatusCode::BAD_REQUEST, _) => ResourceError::InvalidRequest(message),
            (StatusCode::NOT_FOUND, _) => ResourceError::NotFound(booking_ref.clone()),
            (StatusCode::CONFLICT, Call::Book) => ResourceError::AlreadyExists(booking_ref.clone()),
            (StatusCode::CONFLICT, Call::Cancel) => ResourceError::CompensationFailed {
                booking_ref: booking_ref.clone(),
                reason: message,
            },
            _ => ResourceError::Unavailable(message),
        }
    }
}

fn transport(e: reqwest::Error) -> ResourceError {
    ResourceError::Unavailable(e.to_string())
}

#[async_trait]
impl ResourceBookingClient for HttpResourceClient {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[tracing::instrument(skip(self, request), fields(kind = %self.kind))]
    async fn book(&self, booking_ref: &Ref, request: &BookingRequest) -> Result<Confirmation> {
        request.validate()?;

        let response = self
            .http
            .post(self.url(""))
            .query(&[("ref", booking_ref.as_str())])
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::map_error(Call::Book, booking_ref, response).await);
        }
        response.json().await.map_err(transport)
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn get(&self, booking_ref: &Ref) -> Result<Confirmation> {
        let response = self
            .http
            .get(self.url(""))
            .query(&[("ref", booking_ref.as_str())])
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::map_error(Call::Get, booking_ref, response).await);
        }
        response.json().await.map_err(transport)
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn cancel(&self, booking_ref: &Ref) -> Result<()> {
        let response = self
            .http
            .post(self.url("/cancel"))
            .query(&[("ref", booking_ref.as_str())])
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::map_error(Call::Cancel, booking_ref, response).await);
        }
        Ok(())
    }
}
