#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! # Palaver client core
//!
//! UI-independent client engine for a chat inbox fed by three
//! unordered, overlapping sources: optimistic local writes, a live
//! change-event stream, and periodic snapshot polls. The transcript
//! store merges all three into one consistent per-conversation view;
//! the bridge fans decoded change events out to in-process consumers;
//! the sync supervisor runs the poll fallback that bounds staleness
//! when the live stream is down.

pub mod bridge;
pub mod inbox;
pub mod read_marks;
pub mod sync;
pub mod transcript;

pub use bridge::ChangeBridge;
pub use inbox::{ConversationSummary, InboxAggregator};
pub use read_marks::ReadMarks;
pub use sync::{HttpSnapshotSource, SharedTranscript, SnapshotSource, SyncError, SyncSupervisor};
pub use transcript::{MessageDraft, TranscriptEntry, TranscriptStore};
