//! In-memory transcript store with idempotent multi-source merging.
//!
//! The store is a pure reconciliation engine: no I/O, no clocks beyond
//! id synthesis, no locking. Optimistic writes, change events and
//! snapshot polls all funnel into it in whatever order the network
//! produces, and the merge rules keep the result convergent:
//! ingestion is idempotent, delivery status only moves forward, and a
//! stale snapshot can never undo confirmed state.

use shared::models::{ChangeEvent, DeliveryStatus, MessageKind, MessageRow, Timestamp};
use tracing::debug;
use uuid::Uuid;

/// Partial message handed to [`TranscriptStore::apply_optimistic`].
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Explicit id; synthesized from the clock when absent.
    pub id: Option<i64>,
    /// Content variant.
    pub kind: MessageKind,
    /// Raw recipient token.
    pub recipient: Option<String>,
    /// Text body.
    pub text: Option<String>,
    /// Media location for non-text variants.
    pub media_url: Option<String>,
    /// Correlation key of the message being replied to.
    pub reply_to_mid: Option<String>,
    /// Explicit creation time; defaults to now.
    pub created_at: Option<Timestamp>,
}

impl MessageDraft {
    /// Draft for an outgoing text message.
    #[must_use]
    pub fn text(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: MessageKind::Text,
            recipient: Some(recipient.into()),
            text: Some(body.into()),
            media_url: None,
            reply_to_mid: None,
            created_at: None,
        }
    }

    /// Draft for an outgoing media message.
    #[must_use]
    pub fn media(
        kind: MessageKind,
        recipient: impl Into<String>,
        media_url: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind,
            recipient: Some(recipient.into()),
            text: None,
            media_url: Some(media_url.into()),
            reply_to_mid: None,
            created_at: None,
        }
    }
}

/// A message row plus its local delivery status.
///
/// Status is client-side only; rows on the wire never carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// The message row.
    pub row: MessageRow,
    /// Local delivery state.
    pub status: DeliveryStatus,
}

/// The message store: every entry the client currently knows about,
/// in arrival order. Read accessors sort by creation time.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale replace for the initial load. Unlike
    /// [`reconcile`](Self::reconcile) this drops local state.
    pub fn seed(&mut self, snapshot: Vec<MessageRow>) {
        self.entries = snapshot.into_iter().map(confirmed).collect();
    }

    /// Appends an optimistic local write and returns the stored record
    /// so the send path can correlate the eventual confirmation.
    ///
    /// The id is the current epoch milliseconds, bumped until locally
    /// unique; the correlation key is a fresh local token. When the
    /// draft carries an explicit id that already exists, the existing
    /// entry is returned unchanged.
    pub fn apply_optimistic(&mut self, draft: MessageDraft) -> TranscriptEntry {
        if let Some(id) = draft.id {
            if let Some(existing) = self.entries.iter().find(|entry| entry.row.id == id) {
                return existing.clone();
            }
        }

        let id = draft.id.unwrap_or_else(|| self.next_local_id());
        let row = MessageRow {
            id,
            kind: draft.kind,
            sender: None,
            recipient: draft.recipient,
            text: draft.text,
            media_url: draft.media_url,
            reply_to_mid: draft.reply_to_mid,
            mid: Some(format!("local-{}", Uuid::new_v4().simple())),
            created_at: draft.created_at.unwrap_or_else(Timestamp::now),
        };

        let entry = TranscriptEntry {
            row,
            status: DeliveryStatus::Sending,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Ingests one change event. Idempotent: replaying an event leaves
    /// the store unchanged.
    pub fn apply_event(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Insert { row } => {
                // Inserts may confirm an optimistic entry, so they
                // match on the full identity rule (id or shared mid).
                match self.position_by_identity(row) {
                    Some(index) => self.entries[index] = confirmed(row.clone()),
                    None => self.entries.push(confirmed(row.clone())),
                }
            }
            ChangeEvent::Update { row, .. } => {
                // Updates target an already-committed row; id only.
                match self.entries.iter().position(|entry| entry.row.id == row.id) {
                    Some(index) => self.entries[index] = confirmed(row.clone()),
                    None => {
                        debug!(id = row.id, "update for unknown row ignored; poll will repair");
                    }
                }
            }
            ChangeEvent::Delete { row } => {
                let before = self.entries.len();
                self.entries.retain(|entry| entry.row.id != row.id);
                if self.entries.len() == before {
                    debug!(id = row.id, "delete for unknown row ignored");
                }
            }
        }
    }

    /// Marks an optimistic entry as failed after its send attempt
    /// errored. Only `Sending` entries move; confirmed entries are
    /// left alone. Returns whether anything changed.
    pub fn mark_failed(&mut self, id: i64) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.row.id == id && entry.status == DeliveryStatus::Sending)
        {
            Some(entry) => {
                entry.status = DeliveryStatus::Error;
                true
            }
            None => false,
        }
    }

    /// Merges a snapshot poll into the store.
    ///
    /// Snapshot rows are authoritative for everything they contain.
    /// Local entries absent from the snapshot are retained when still
    /// `Sending` (the in-flight send must not vanish) and when already
    /// `Sent` (a stale snapshot must not undo a confirmed row; real
    /// removals arrive as delete events). Failed sends are cleared.
    pub fn reconcile(&mut self, snapshot: Vec<MessageRow>) {
        let mut next: Vec<TranscriptEntry> = snapshot.into_iter().map(confirmed).collect();

        for entry in &self.entries {
            let known = next
                .iter()
                .any(|candidate| candidate.row.same_identity(&entry.row));
            if known {
                continue;
            }
            match entry.status {
                DeliveryStatus::Sending | DeliveryStatus::Sent => next.push(entry.clone()),
                DeliveryStatus::Error => {}
            }
        }

        self.entries = next;
    }

    /// All entries ordered by creation time, ties in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<TranscriptEntry> {
        let mut ordered = self.entries.clone();
        ordered.sort_by_key(|entry| entry.row.created_at);
        ordered
    }

    /// Entries of one conversation, ordered like [`messages`](Self::messages).
    #[must_use]
    pub fn conversation(&self, conversation_id: &str) -> Vec<TranscriptEntry> {
        let mut ordered: Vec<TranscriptEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.row.conversation_id() == Some(conversation_id))
            .cloned()
            .collect();
        ordered.sort_by_key(|entry| entry.row.created_at);
        ordered
    }

    /// Unsorted view of everything held, for derived read models.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position_by_identity(&self, row: &MessageRow) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.row.same_identity(row))
    }

    fn next_local_id(&self) -> i64 {
        let mut id = Timestamp::now().millis();
        while self.entries.iter().any(|entry| entry.row.id == id) {
            id += 1;
        }
        id
    }
}

fn confirmed(row: MessageRow) -> TranscriptEntry {
    TranscriptEntry {
        row,
        status: DeliveryStatus::Sent,
    }
}
