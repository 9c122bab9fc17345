//! Turns qualifying change events into push fan-out passes.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use metrics::counter;
use shared::models::{ChangeEvent, MessageRow, NotificationData, NotificationPayload};
use tracing::{info, instrument, warn};

use super::contacts::ContactDirectory;
use super::push_gateway::PushGateway;
use super::registry::SubscriptionRegistry;

const MEDIA_BODY: &str = "📎 Media message";

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscriptions the pass attempted.
    pub attempted: usize,
    /// Deliveries the provider accepted.
    pub delivered: usize,
    /// Subscriptions dropped after a permanent provider verdict.
    pub pruned: usize,
    /// Failures that kept their subscription.
    pub failed: usize,
}

impl DeliveryReport {
    /// Human-readable delivery summary, `Sent <delivered>/<attempted>`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("Sent {}/{}", self.delivered, self.attempted)
    }
}

/// Drives one fan-out pass per qualifying message event.
pub struct Notifier {
    registry: Arc<dyn SubscriptionRegistry>,
    contacts: Arc<dyn ContactDirectory>,
    gateway: Arc<dyn PushGateway>,
}

impl Notifier {
    #[must_use]
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        contacts: Arc<dyn ContactDirectory>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        Self {
            registry,
            contacts,
            gateway,
        }
    }

    /// Feeds one change event through the fan-out. Only inserts of
    /// incoming messages (sender populated) qualify; everything else
    /// returns `Ok(None)` without side effects.
    ///
    /// # Errors
    /// Returns an error when the subscription listing fails; delivery
    /// failures are absorbed into the report instead.
    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<Option<DeliveryReport>> {
        let ChangeEvent::Insert { row } = event else {
            return Ok(None);
        };
        let Some(sender) = row.sender.as_deref().filter(|sender| !sender.is_empty()) else {
            return Ok(None);
        };
        let report = self.notify_message(sender, row).await?;
        Ok(Some(report))
    }

    /// One fan-out pass announcing an incoming message.
    ///
    /// # Errors
    /// Returns an error when the subscription listing fails.
    #[instrument(skip(self, row))]
    pub async fn notify_message(&self, sender: &str, row: &MessageRow) -> Result<DeliveryReport> {
        let title = self.display_name(sender).await;
        let body = row
            .text
            .clone()
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| MEDIA_BODY.to_string());
        let payload = NotificationPayload {
            title,
            body,
            data: NotificationData {
                contact_id: Some(sender.to_string()),
            },
        };

        self.send_to_all(&payload).await
    }

    /// Delivers one payload to every registered subscription.
    ///
    /// Deliveries run concurrently and independently: a dead or slow
    /// endpoint cannot delay or abort the others. Endpoints the
    /// provider reports gone are dropped from the registry; any other
    /// failure is logged and the subscription kept. No retries inside
    /// a pass.
    ///
    /// # Errors
    /// Returns an error when the subscription listing fails; nothing
    /// has been delivered in that case.
    pub async fn send_to_all(&self, payload: &NotificationPayload) -> Result<DeliveryReport> {
        let subscriptions = self
            .registry
            .list_all()
            .await
            .context("subscription listing failed")?;

        let mut report = DeliveryReport {
            attempted: subscriptions.len(),
            ..DeliveryReport::default()
        };

        let attempts = subscriptions.iter().map(|subscription| async move {
            let outcome = self.gateway.deliver(subscription, payload).await;
            (subscription, outcome)
        });

        for (subscription, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => {
                    report.delivered += 1;
                    counter!("push_deliveries_total", "outcome" => "delivered").increment(1);
                }
                Err(error) if error.is_gone() => {
                    report.pruned += 1;
                    counter!("push_deliveries_total", "outcome" => "pruned").increment(1);
                    info!(endpoint = %subscription.endpoint, "subscription gone; removing");
                    if let Err(delete_error) = self.registry.delete(&subscription.endpoint).await {
                        warn!(
                            endpoint = %subscription.endpoint,
                            error = %delete_error,
                            "failed to remove dead subscription"
                        );
                    }
                }
                Err(error) => {
                    report.failed += 1;
                    counter!("push_deliveries_total", "outcome" => "failed").increment(1);
                    warn!(endpoint = %subscription.endpoint, %error, "push delivery failed");
                }
            }
        }

        counter!("fanout_passes_total").increment(1);
        info!(
            delivered = report.delivered,
            attempted = report.attempted,
            pruned = report.pruned,
            "push fan-out complete"
        );
        Ok(report)
    }

    async fn display_name(&self, sender: &str) -> String {
        match self.contacts.display_name(sender).await {
            Ok(Some(name)) => name,
            Ok(None) => format!("+{sender}"),
            Err(error) => {
                warn!(%error, sender, "contact lookup failed");
                format!("+{sender}")
            }
        }
    }
}
