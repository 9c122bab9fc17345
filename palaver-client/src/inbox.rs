//! Sidebar read model: per-conversation summaries derived on demand
//! from the transcript store plus local read state.

use std::collections::{HashMap, HashSet};

use shared::models::{Direction, Timestamp};

use crate::read_marks::ReadMarks;
use crate::transcript::TranscriptEntry;

/// One sidebar line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Numeric counterpart token the conversation is keyed by.
    pub conversation_id: String,
    /// Preview of the newest message.
    pub last_message_preview: String,
    /// Creation time of the newest message.
    pub last_message_at: Timestamp,
    /// Incoming messages not yet marked read.
    pub unread_count: usize,
    /// Whether the per-conversation assistant toggle is on.
    pub assistant_enabled: bool,
}

/// Groups transcript entries into conversation summaries.
///
/// Owns the durable read marks and the local assistant toggles; the
/// transcript itself stays in the store and is passed in per call, so
/// a summary is always a pure function of current store contents.
#[derive(Debug)]
pub struct InboxAggregator {
    read_marks: ReadMarks,
    assistant_muted: HashSet<String>,
}

impl InboxAggregator {
    /// Creates an aggregator around previously loaded read marks.
    #[must_use]
    pub fn new(read_marks: ReadMarks) -> Self {
        Self {
            read_marks,
            assistant_muted: HashSet::new(),
        }
    }

    /// Builds the sidebar, newest conversation first. Rows that derive
    /// no conversation id are skipped.
    #[must_use]
    pub fn summarize(&self, entries: &[TranscriptEntry]) -> Vec<ConversationSummary> {
        let mut grouped: HashMap<String, ConversationSummary> = HashMap::new();

        for entry in entries {
            let Some(conversation_id) = entry.row.conversation_id() else {
                continue;
            };

            let unread = usize::from(
                entry.row.direction() == Direction::Incoming
                    && !self.read_marks.contains(entry.row.id),
            );

            match grouped.get_mut(conversation_id) {
                Some(summary) => {
                    summary.unread_count += unread;
                    // Later arrivals win creation-time ties, matching
                    // the transcript's stable sort.
                    if entry.row.created_at >= summary.last_message_at {
                        summary.last_message_at = entry.row.created_at;
                        summary.last_message_preview = entry.row.preview();
                    }
                }
                None => {
                    grouped.insert(
                        conversation_id.to_string(),
                        ConversationSummary {
                            conversation_id: conversation_id.to_string(),
                            last_message_preview: entry.row.preview(),
                            last_message_at: entry.row.created_at,
                            unread_count: unread,
                            assistant_enabled: !self.assistant_muted.contains(conversation_id),
                        },
                    );
                }
            }
        }

        let mut summaries: Vec<ConversationSummary> = grouped.into_values().collect();
        summaries.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        summaries
    }

    /// Marks every message of one conversation as read and persists.
    /// Returns whether any mark was new.
    pub fn mark_conversation_read(
        &mut self,
        conversation_id: &str,
        entries: &[TranscriptEntry],
    ) -> bool {
        let ids: Vec<i64> = entries
            .iter()
            .filter(|entry| entry.row.conversation_id() == Some(conversation_id))
            .map(|entry| entry.row.id)
            .collect();
        self.read_marks.mark_read(ids)
    }

    /// Flips the local assistant toggle for one conversation.
    pub fn set_assistant_enabled(&mut self, conversation_id: &str, enabled: bool) {
        if enabled {
            self.assistant_muted.remove(conversation_id);
        } else {
            self.assistant_muted.insert(conversation_id.to_string());
        }
    }

    /// Current assistant toggle for one conversation; on by default.
    #[must_use]
    pub fn assistant_enabled(&self, conversation_id: &str) -> bool {
        !self.assistant_muted.contains(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use shared::models::{DeliveryStatus, MessageKind, MessageRow};

    use super::*;

    fn entry(id: i64, sender: Option<&str>, recipient: Option<&str>, ms: i64) -> TranscriptEntry {
        TranscriptEntry {
            row: MessageRow {
                id,
                kind: MessageKind::Text,
                sender: sender.map(str::to_string),
                recipient: recipient.map(str::to_string),
                text: Some(format!("message {id}")),
                media_url: None,
                reply_to_mid: None,
                mid: None,
                created_at: Timestamp::from_millis(ms),
            },
            status: DeliveryStatus::Sent,
        }
    }

    fn aggregator() -> (InboxAggregator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let marks = ReadMarks::load(dir.path().join("read_marks.json"));
        (InboxAggregator::new(marks), dir)
    }

    #[test]
    fn summaries_group_by_conversation_newest_first() {
        let (aggregator, _dir) = aggregator();
        let entries = vec![
            entry(1, Some("4915551234"), None, 1_000),
            entry(2, Some("4900000000"), None, 5_000),
            entry(3, None, Some("4915551234"), 3_000),
        ];

        let summaries = aggregator.summarize(&entries);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].conversation_id, "4900000000");
        assert_eq!(summaries[1].conversation_id, "4915551234");
        assert_eq!(summaries[1].last_message_preview, "message 3");
        assert_eq!(summaries[1].last_message_at, Timestamp::from_millis(3_000));
    }

    #[test]
    fn unread_counts_skip_read_and_outgoing_messages() {
        let (mut aggregator, _dir) = aggregator();
        aggregator.read_marks.mark_read([1]);
        let entries = vec![
            entry(1, Some("4915551234"), None, 1_000),
            entry(2, Some("4915551234"), None, 2_000),
            entry(3, None, Some("4915551234"), 3_000),
        ];

        let summaries = aggregator.summarize(&entries);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].unread_count, 1);
    }

    #[test]
    fn opening_a_conversation_clears_its_unread_count() {
        let (mut aggregator, _dir) = aggregator();
        let entries = vec![
            entry(1, Some("4915551234"), None, 1_000),
            entry(2, Some("4900000000"), None, 2_000),
        ];

        assert!(aggregator.mark_conversation_read("4915551234", &entries));
        let summaries = aggregator.summarize(&entries);

        let opened = summaries
            .iter()
            .find(|s| s.conversation_id == "4915551234")
            .unwrap();
        let untouched = summaries
            .iter()
            .find(|s| s.conversation_id == "4900000000")
            .unwrap();
        assert_eq!(opened.unread_count, 0);
        assert_eq!(untouched.unread_count, 1);
    }

    #[test]
    fn assistant_toggle_is_per_conversation_and_defaults_on() {
        let (mut aggregator, _dir) = aggregator();
        assert!(aggregator.assistant_enabled("4915551234"));

        aggregator.set_assistant_enabled("4915551234", false);
        assert!(!aggregator.assistant_enabled("4915551234"));
        assert!(aggregator.assistant_enabled("4900000000"));

        let summaries = aggregator.summarize(&[entry(1, Some("4915551234"), None, 1_000)]);
        assert!(!summaries[0].assistant_enabled);

        aggregator.set_assistant_enabled("4915551234", true);
        assert!(aggregator.assistant_enabled("4915551234"));
    }

    #[test]
    fn rows_without_a_conversation_are_skipped() {
        let (aggregator, _dir) = aggregator();
        let entries = vec![entry(1, Some("ops-team"), Some("also-not-numeric"), 1_000)];

        assert!(aggregator.summarize(&entries).is_empty());
    }

    #[test]
    fn media_rows_use_kind_labels_as_previews() {
        let (aggregator, _dir) = aggregator();
        let mut voice = entry(1, Some("4915551234"), None, 1_000);
        voice.row.kind = MessageKind::Audio;
        voice.row.text = None;

        let summaries = aggregator.summarize(&[voice]);
        assert_eq!(summaries[0].last_message_preview, "🎤 Voice message");
    }
}
