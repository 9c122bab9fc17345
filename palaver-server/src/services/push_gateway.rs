use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use shared::config::PushConfig;
use shared::models::{NotificationPayload, PushSubscription};
use thiserror::Error;
use tokio::sync::Mutex;

/// Why a delivery failed.
#[derive(Debug, Error)]
pub enum PushError {
    /// The provider reports the subscription permanently dead; the
    /// registry should drop it.
    #[error("subscription gone: endpoint returned {status}")]
    Gone { status: u16 },
    /// The provider rejected this delivery; the subscription stays.
    #[error("push rejected with status {status}")]
    Rejected { status: u16 },
    /// The transport never produced a provider verdict.
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl PushError {
    /// Whether the subscription should be removed from the registry.
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }
}

/// Delivery boundary to the push provider. One call, one endpoint, one
/// payload; retries and queueing are explicitly not this layer's job.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Delivers one payload to one subscription endpoint.
    ///
    /// # Errors
    /// Returns a [`PushError`] describing whether the subscription is
    /// permanently gone, was rejected for this delivery, or never
    /// reached the provider.
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError>;
}

/// Gateway that POSTs the payload to the subscription endpoint.
///
/// The provider-side encryption handshake lives behind the endpoint;
/// this side only ships the JSON payload within a bounded timeout.
#[derive(Clone)]
pub struct WebPushGateway {
    client: reqwest::Client,
}

impl WebPushGateway {
    /// Builds a gateway with the configured request timeout.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be constructed.
    #[must_use]
    pub fn new(config: &PushConfig) -> Self {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Client should build");
        Self { client }
    }
}

#[async_trait]
impl PushGateway for WebPushGateway {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .json(payload)
            .send()
            .await?;
        classify_status(response.status())
    }
}

fn classify_status(status: StatusCode) -> Result<(), PushError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone {
            status: status.as_u16(),
        }),
        _ => Err(PushError::Rejected {
            status: status.as_u16(),
        }),
    }
}

/// Gateway double that records every delivery and fails the endpoints
/// it was told to. Used by unit tests and the HTTP scenario test.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    gone: HashSet<String>,
    rejected: HashSet<String>,
    deliveries: Mutex<Vec<(String, NotificationPayload)>>,
}

impl RecordingGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks endpoints that respond as permanently gone.
    #[must_use]
    pub fn with_gone<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gone.extend(endpoints.into_iter().map(Into::into));
        self
    }

    /// Marks endpoints that reject deliveries without being gone.
    #[must_use]
    pub fn with_rejected<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected.extend(endpoints.into_iter().map(Into::into));
        self
    }

    /// Every `(endpoint, payload)` delivery attempted so far.
    pub async fn deliveries(&self) -> Vec<(String, NotificationPayload)> {
        self.deliveries.lock().await.clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        self.deliveries
            .lock()
            .await
            .push((subscription.endpoint.clone(), payload.clone()));

        if self.gone.contains(&subscription.endpoint) {
            return Err(PushError::Gone { status: 410 });
        }
        if self.rejected.contains(&subscription.endpoint) {
            return Err(PushError::Rejected { status: 429 });
        }
        Ok(())
    }
}
