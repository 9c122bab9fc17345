//! Background synchronization: feeds the transcript store from the
//! change stream and a periodic safety poll, plus on-demand resyncs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::models::MessageRow;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::ChangeBridge;
use crate::transcript::TranscriptStore;

/// Transcript store shared between the UI and the supervisor tasks.
pub type SharedTranscript = Arc<Mutex<TranscriptStore>>;

/// Failure talking to the snapshot endpoint.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level failure, including non-success statuses and
    /// undecodable bodies.
    #[error("snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Source-specific failure outside HTTP transport.
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),
}

/// Where full message snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetches the snapshot, optionally scoped to one conversation.
    async fn fetch(&self, conversation: Option<&str>) -> Result<Vec<MessageRow>, SyncError>;
}

/// [`SnapshotSource`] backed by the server's `/api/messages` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    /// Creates a source for the given server base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, conversation: Option<&str>) -> Result<Vec<MessageRow>, SyncError> {
        let mut request = self.client.get(format!("{}/api/messages", self.base_url));
        if let Some(conversation) = conversation {
            request = request.query(&[("conversation", conversation)]);
        }

        let rows = request
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<MessageRow>>()
            .await?;
        Ok(rows)
    }
}

/// Drives the transcript store from its two background feeds.
///
/// One task consumes the change bridge and applies every event; one
/// task reconciles a full snapshot on a fixed interval regardless of
/// how healthy the stream looks. [`resync`](Self::resync) is the
/// on-demand variant for the moments staleness is most likely, such
/// as the app regaining visibility or the network coming back.
pub struct SyncSupervisor {
    store: SharedTranscript,
    source: Arc<dyn SnapshotSource>,
    bridge: Arc<ChangeBridge>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl SyncSupervisor {
    /// Creates a supervisor; nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(
        store: SharedTranscript,
        source: Arc<dyn SnapshotSource>,
        bridge: Arc<ChangeBridge>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            bridge,
            poll_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Fetches the snapshot and seeds the store wholesale. Meant to
    /// run once before [`start`](Self::start).
    ///
    /// # Errors
    /// Returns the fetch failure; the store is left untouched.
    pub async fn initial_load(&self) -> Result<(), SyncError> {
        let snapshot = self.source.fetch(None).await?;
        self.store.lock().await.seed(snapshot);
        Ok(())
    }

    /// Fetches the snapshot and reconciles it into the store,
    /// unconditionally.
    ///
    /// # Errors
    /// Returns the fetch failure; the store keeps its current state
    /// and the next poll cycle retries.
    pub async fn resync(&self) -> Result<(), SyncError> {
        reconcile_from(&self.store, self.source.as_ref()).await
    }

    /// Spawns the stream consumer and the safety poll. Both run until
    /// [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let consumer = {
            let store = Arc::clone(&self.store);
            let bridge = Arc::clone(&self.bridge);
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                let (slot, mut events) = bridge.subscribe().await;
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        event = events.recv() => match event {
                            Some(event) => store.lock().await.apply_event(&event),
                            None => break,
                        },
                    }
                }
                bridge.unsubscribe(&slot).await;
                debug!("change consumer stopped");
            })
        };

        let poller = {
            let store = Arc::clone(&self.store);
            let source = Arc::clone(&self.source);
            let token = self.shutdown.clone();
            let mut ticker = tokio::time::interval(self.poll_interval);
            // No catch-up bursts after a suspend; the next tick covers it.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tokio::spawn(async move {
                // The first tick completes immediately; the stream is
                // already live by now, so skip straight to the cadence.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(error) = reconcile_from(&store, source.as_ref()).await {
                                warn!(%error, "safety poll failed; keeping local state");
                            }
                        }
                    }
                }
                debug!("safety poll stopped");
            })
        };

        vec![consumer, poller]
    }

    /// Stops both background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn reconcile_from(
    store: &SharedTranscript,
    source: &dyn SnapshotSource,
) -> Result<(), SyncError> {
    let snapshot = source.fetch(None).await?;
    store.lock().await.reconcile(snapshot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use shared::models::{ChangeEvent, DeliveryStatus, MessageKind, Timestamp};

    use super::*;
    use crate::transcript::MessageDraft;

    struct FakeSource {
        rows: std::sync::Mutex<Vec<MessageRow>>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with_rows(rows: Vec<MessageRow>) -> Self {
            Self {
                rows: std::sync::Mutex::new(rows),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeSource {
        async fn fetch(&self, _conversation: Option<&str>) -> Result<Vec<MessageRow>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::Unavailable("down".to_string()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn row(id: i64, ms: i64) -> MessageRow {
        MessageRow {
            id,
            kind: MessageKind::Text,
            sender: Some("4915551234".to_string()),
            recipient: None,
            text: Some(format!("message {id}")),
            media_url: None,
            reply_to_mid: None,
            mid: None,
            created_at: Timestamp::from_millis(ms),
        }
    }

    fn shared_store() -> SharedTranscript {
        Arc::new(Mutex::new(TranscriptStore::new()))
    }

    #[tokio::test]
    async fn initial_load_seeds_the_store() {
        let store = shared_store();
        let source = Arc::new(FakeSource::with_rows(vec![row(1, 1_000), row(2, 2_000)]));
        let supervisor = SyncSupervisor::new(
            Arc::clone(&store),
            source,
            Arc::new(ChangeBridge::new()),
            Duration::from_secs(30),
        );

        supervisor.initial_load().await.unwrap();

        assert_eq!(store.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn resync_merges_without_dropping_inflight_sends() {
        let store = shared_store();
        let optimistic = store
            .lock()
            .await
            .apply_optimistic(MessageDraft::text("4915551234", "hi"));
        let source = Arc::new(FakeSource::with_rows(vec![row(1, 1_000)]));
        let supervisor = SyncSupervisor::new(
            Arc::clone(&store),
            source,
            Arc::new(ChangeBridge::new()),
            Duration::from_secs(30),
        );

        supervisor.resync().await.unwrap();

        let guard = store.lock().await;
        assert_eq!(guard.len(), 2);
        let kept = guard
            .entries()
            .iter()
            .find(|entry| entry.row.id == optimistic.row.id)
            .unwrap();
        assert_eq!(kept.status, DeliveryStatus::Sending);
    }

    #[tokio::test]
    async fn resync_failure_keeps_local_state() {
        let store = shared_store();
        store.lock().await.seed(vec![row(1, 1_000)]);
        let source = Arc::new(FakeSource::with_rows(Vec::new()));
        source.fail.store(true, Ordering::SeqCst);
        let supervisor = SyncSupervisor::new(
            Arc::clone(&store),
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            Arc::new(ChangeBridge::new()),
            Duration::from_secs(30),
        );

        assert!(supervisor.resync().await.is_err());
        assert_eq!(store.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn stream_events_reach_the_store_until_shutdown() {
        let store = shared_store();
        let bridge = Arc::new(ChangeBridge::new());
        let supervisor = SyncSupervisor::new(
            Arc::clone(&store),
            Arc::new(FakeSource::with_rows(Vec::new())),
            Arc::clone(&bridge),
            Duration::from_secs(3_600),
        );
        let handles = supervisor.start();

        bridge.publish(&ChangeEvent::Insert { row: row(1, 1_000) }).await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while store.lock().await.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        supervisor.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(bridge.consumer_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn safety_poll_reconciles_on_interval() {
        let store = shared_store();
        let source = Arc::new(FakeSource::with_rows(vec![row(1, 1_000)]));
        let supervisor = SyncSupervisor::new(
            Arc::clone(&store),
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            Arc::new(ChangeBridge::new()),
            Duration::from_secs(30),
        );
        let handles = supervisor.start();

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(source.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(store.lock().await.len(), 1);

        supervisor.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
