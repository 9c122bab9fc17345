//! Change-stream intake: consumes the message table's notify channel
//! and drives the push fan-out.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use shared::models::ChangeEvent;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::Notifier;

/// Notify channel the bootstrap trigger publishes on.
pub(crate) const CHANNEL: &str = "palaver_message_events";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Consumes the change feed until cancelled. A dropped connection is
/// re-established after a short delay; events emitted while detached
/// are simply missed, since client staleness is bounded by the poll
/// fallback rather than by stream replay.
pub async fn run_change_listener(
    pool: PgPool,
    notifier: Arc<Notifier>,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match PgListener::connect_with(&pool).await {
            Ok(mut listener) => match listener.listen(CHANNEL).await {
                Ok(()) => {
                    info!(channel = CHANNEL, "change stream attached");
                    consume(&mut listener, &notifier, &shutdown).await;
                }
                Err(error) => warn!(%error, "listen failed; retrying"),
            },
            Err(error) => warn!(%error, "change stream connect failed; retrying"),
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
    debug!("change listener stopped");
}

async fn consume(listener: &mut PgListener, notifier: &Notifier, shutdown: &CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            notification = listener.recv() => match notification {
                Ok(notification) => {
                    let Some(event) = decode_payload(notification.payload()) else {
                        continue;
                    };
                    counter!("change_events_total", "kind" => event.kind()).increment(1);
                    match notifier.handle_event(&event).await {
                        Ok(Some(report)) => debug!(
                            delivered = report.delivered,
                            attempted = report.attempted,
                            "fan-out pass finished"
                        ),
                        Ok(None) => {}
                        Err(error) => warn!(%error, "fan-out pass failed"),
                    }
                }
                Err(error) => {
                    warn!(%error, "change stream dropped; reconnecting");
                    return;
                }
            }
        }
    }
}

/// Decodes one notify payload. Malformed payloads are logged and
/// dropped; they must never take the listener down.
fn decode_payload(payload: &str) -> Option<ChangeEvent> {
    match ChangeEvent::decode(payload) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(%error, "undecodable change payload dropped");
            None
        }
    }
}
