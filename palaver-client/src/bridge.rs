//! Process-wide fan-out of the upstream change stream.
//!
//! Exactly one transport subscription feeds [`ChangeBridge::publish`];
//! every attached consumer gets its own queue and sees events in the
//! order they were published. The bridge never filters, dedups or
//! reorders: convergence is the transcript store's job.

use std::collections::HashMap;

use shared::models::ChangeEvent;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// Shared hub between the single upstream subscription and any number
/// of in-process consumers. Intended to live behind an [`Arc`](std::sync::Arc)
/// created once at startup.
#[derive(Debug)]
pub struct ChangeBridge {
    capacity: usize,
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<ChangeEvent>>>,
}

impl ChangeBridge {
    /// Creates a bridge with the default consumer queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Creates a bridge with an explicit per-consumer queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a consumer and returns its token plus the receiving
    /// end of its queue. The token releases the slot via
    /// [`unsubscribe`](Self::unsubscribe).
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let token = Uuid::new_v4();
        self.subscribers.lock().await.insert(token, tx);
        debug!(%token, "change consumer attached");
        (token, rx)
    }

    /// Detaches a consumer. Unknown tokens are ignored.
    pub async fn unsubscribe(&self, token: &Uuid) {
        if self.subscribers.lock().await.remove(token).is_some() {
            debug!(%token, "change consumer detached");
        }
    }

    /// Delivers one event to every live consumer.
    ///
    /// A full queue is awaited rather than dropped, since every event
    /// matters for convergence; a closed queue gets its slot pruned.
    pub async fn publish(&self, event: &ChangeEvent) {
        let targets: Vec<(Uuid, mpsc::Sender<ChangeEvent>)> = {
            let guard = self.subscribers.lock().await;
            guard
                .iter()
                .map(|(token, sender)| (*token, sender.clone()))
                .collect()
        };

        let mut closed = Vec::new();
        for (token, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(pending)) => {
                    if sender.send(pending).await.is_err() {
                        closed.push(token);
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(token),
            }
        }

        if !closed.is_empty() {
            let mut guard = self.subscribers.lock().await;
            for token in closed {
                if guard.remove(&token).is_some() {
                    debug!(%token, "pruned closed change consumer");
                }
            }
        }

        trace!(kind = event.kind(), "change event fanned out");
    }

    /// Number of currently attached consumers.
    pub async fn consumer_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for ChangeBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared::models::{MessageKind, MessageRow, Timestamp};

    use super::*;

    fn insert_event(id: i64) -> ChangeEvent {
        ChangeEvent::Insert {
            row: MessageRow {
                id,
                kind: MessageKind::Text,
                sender: Some("4915551234".to_string()),
                recipient: None,
                text: Some("hello".to_string()),
                media_url: None,
                reply_to_mid: None,
                mid: None,
                created_at: Timestamp::from_millis(id * 1_000),
            },
        }
    }

    #[tokio::test]
    async fn every_consumer_sees_events_in_emission_order() {
        let bridge = ChangeBridge::new();
        let (_first, mut first_rx) = bridge.subscribe().await;
        let (_second, mut second_rx) = bridge.subscribe().await;

        for id in 1..=3 {
            bridge.publish(&insert_event(id)).await;
        }

        for rx in [&mut first_rx, &mut second_rx] {
            let mut ids = Vec::new();
            for _ in 0..3 {
                match rx.recv().await {
                    Some(ChangeEvent::Insert { row }) => ids.push(row.id),
                    other => panic!("unexpected event: {other:?}"),
                }
            }
            assert_eq!(ids, vec![1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn unsubscribed_consumers_receive_nothing() {
        let bridge = ChangeBridge::new();
        let (token, mut rx) = bridge.subscribe().await;
        bridge.unsubscribe(&token).await;

        bridge.publish(&insert_event(1)).await;

        assert_eq!(bridge.consumer_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_consumers_are_pruned_on_publish() {
        let bridge = ChangeBridge::new();
        let (_token, rx) = bridge.subscribe().await;
        drop(rx);

        bridge.publish(&insert_event(1)).await;

        assert_eq!(bridge.consumer_count().await, 0);
    }

    #[tokio::test]
    async fn full_consumer_queue_is_awaited_not_dropped() {
        let bridge = Arc::new(ChangeBridge::with_capacity(1));
        let (_token, mut rx) = bridge.subscribe().await;

        let publisher = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                for id in 1..=3 {
                    bridge.publish(&insert_event(id)).await;
                }
            })
        };

        let mut ids = Vec::new();
        while ids.len() < 3 {
            match rx.recv().await {
                Some(ChangeEvent::Insert { row }) => ids.push(row.id),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        publisher.await.unwrap();

        assert_eq!(ids, vec![1, 2, 3]);
    }
}
