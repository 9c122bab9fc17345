use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::MessageRow;

/// Reference to a removed row. Delete payloads may carry only the
/// primary key, so everything else is ignored on decode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DeletedRow {
    /// Identifier of the removed message.
    pub id: i64,
}

/// One mutation observed on the message table, as emitted by the
/// change stream.
///
/// The wire shape is `{"event_type": ..., "new": ..., "old": ...}` with
/// the unused half set to null. Decoding happens exactly once, at the
/// transport boundary; everything downstream consumes this enum. A
/// payload whose required half is missing fails to decode and is
/// dropped (with a log line) by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A new row was committed.
    Insert {
        /// The committed row.
        #[serde(rename = "new")]
        row: MessageRow,
    },
    /// An existing row changed.
    Update {
        /// Pre-image reference, when the stream provides one.
        #[serde(rename = "old", default)]
        previous: Option<DeletedRow>,
        /// The row after the change.
        #[serde(rename = "new")]
        row: MessageRow,
    },
    /// A row was removed.
    Delete {
        /// Reference to the removed row.
        #[serde(rename = "old")]
        row: DeletedRow,
    },
}

impl ChangeEvent {
    /// Decodes a raw change-stream payload.
    ///
    /// # Errors
    /// Returns the underlying serde error when the payload is not a
    /// well-formed event, including events missing their required row
    /// half.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    #[test]
    fn decodes_insert_with_null_old_half() {
        let payload = r#"{
            "event_type": "insert",
            "new": {"id": 10, "kind": "text", "sender": "12345",
                    "text": "hello", "created_at": "2025-06-01T09:00:00Z"},
            "old": null
        }"#;

        let event = ChangeEvent::decode(payload).unwrap();
        match event {
            ChangeEvent::Insert { row } => {
                assert_eq!(row.id, 10);
                assert_eq!(row.kind, MessageKind::Text);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn decodes_update_with_full_pre_image() {
        let payload = r#"{
            "event_type": "update",
            "new": {"id": 10, "kind": "text", "text": "edited",
                    "created_at": "2025-06-01T09:00:00Z"},
            "old": {"id": 10, "kind": "text", "text": "hello",
                    "created_at": "2025-06-01T09:00:00Z"}
        }"#;

        let event = ChangeEvent::decode(payload).unwrap();
        match event {
            ChangeEvent::Update { previous, row } => {
                assert_eq!(previous, Some(DeletedRow { id: 10 }));
                assert_eq!(row.text.as_deref(), Some("edited"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn decodes_delete_with_key_only_pre_image() {
        let payload = r#"{"event_type": "delete", "new": null, "old": {"id": 42}}"#;

        let event = ChangeEvent::decode(payload).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Delete {
                row: DeletedRow { id: 42 }
            }
        );
        assert_eq!(event.kind(), "delete");
    }

    #[test]
    fn rejects_events_missing_their_row_half() {
        assert!(ChangeEvent::decode(r#"{"event_type": "insert", "new": null}"#).is_err());
        assert!(ChangeEvent::decode(r#"{"event_type": "delete", "old": null}"#).is_err());
        assert!(ChangeEvent::decode(r#"{"event_type": "truncate"}"#).is_err());
    }

    #[test]
    fn rejects_rows_without_created_at() {
        let payload = r#"{"event_type": "insert", "new": {"id": 1, "kind": "text"}}"#;
        assert!(ChangeEvent::decode(payload).is_err());
    }
}
