use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Timestamp;

/// Content variant of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message.
    Text,
    /// Image attachment.
    Image,
    /// Voice or audio attachment.
    Audio,
    /// Video attachment.
    Video,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl TryFrom<&str> for MessageKind {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err("invalid message kind"),
        }
    }
}

/// Which side of the conversation a message travels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent by the remote contact.
    Incoming,
    /// Sent by the local account.
    Outgoing,
}

/// Client-side delivery state of a message.
///
/// Only two transitions exist: `Sending -> Sent` when any remote source
/// confirms the row, and `Sending -> Error` when the send attempt fails.
/// A confirmed message never moves back to `Sending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Optimistic local write, not yet confirmed remotely.
    Sending,
    /// Confirmed by the change stream or a snapshot.
    Sent,
    /// The send attempt failed.
    Error,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Error => "error",
        }
    }
}

/// A message row as persisted and carried on the change stream.
///
/// `sender` and `recipient` hold the raw provider pair; exactly one of
/// them is a numeric phone-style token for provider traffic, and that
/// token doubles as the conversation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageRow {
    /// Unique identifier. Optimistic local rows use epoch milliseconds.
    pub id: i64,

    /// Content variant.
    pub kind: MessageKind,

    /// Raw sender token, if any.
    #[serde(default)]
    pub sender: Option<String>,

    /// Raw recipient token, if any.
    #[serde(default)]
    pub recipient: Option<String>,

    /// Text body, present for text messages and media captions.
    #[serde(default)]
    pub text: Option<String>,

    /// Media location for non-text variants.
    #[serde(default)]
    pub media_url: Option<String>,

    /// Correlation key of the message this one replies to, if any.
    #[serde(default)]
    pub reply_to_mid: Option<String>,

    /// Provider correlation key; optimistic rows carry a local one.
    #[serde(default)]
    pub mid: Option<String>,

    /// When the message was created. Rows without it are rejected at
    /// the decode boundary.
    pub created_at: Timestamp,
}

impl MessageRow {
    /// The conversation this message belongs to: whichever of the raw
    /// sender/recipient pair is a numeric token. `None` when neither
    /// side is, in which case the row is not renderable in a thread.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        if let Some(sender) = self.sender.as_deref() {
            if is_numeric_token(sender) {
                return Some(sender);
            }
        }
        if let Some(recipient) = self.recipient.as_deref() {
            if is_numeric_token(recipient) {
                return Some(recipient);
            }
        }
        None
    }

    /// Incoming when the sender is a numeric contact token, outgoing
    /// otherwise (including rows with no sender at all).
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self.sender.as_deref() {
            Some(sender) if is_numeric_token(sender) => Direction::Incoming,
            _ => Direction::Outgoing,
        }
    }

    /// Short display text for list views: the text body, or a variant
    /// label for media-only messages.
    #[must_use]
    pub fn preview(&self) -> String {
        if let Some(text) = self.text.as_deref() {
            if !text.is_empty() {
                return text.to_string();
            }
        }
        match self.kind {
            MessageKind::Audio => "🎤 Voice message".to_string(),
            _ => "📷 Media".to_string(),
        }
    }

    /// Identity rule used by every ingestion path: two rows are the
    /// same message when their ids match, or when both carry a
    /// correlation key and the keys match.
    #[must_use]
    pub fn same_identity(&self, other: &MessageRow) -> bool {
        if self.id == other.id {
            return true;
        }
        match (self.mid.as_deref(), other.mid.as_deref()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

fn is_numeric_token(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
