//! Durable set of message ids the user has already seen.
//!
//! Backed by a small JSON file. Persistence is best-effort: a missing
//! or corrupt file degrades to an empty set and write failures are
//! logged, never surfaced. Losing the file only re-inflates unread
//! counts; it cannot corrupt the transcript.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, warn};

/// Persisted read marks keyed by message id.
#[derive(Debug)]
pub struct ReadMarks {
    path: PathBuf,
    read: HashSet<i64>,
}

impl ReadMarks {
    /// Loads the marks stored at `path`. A missing file yields an
    /// empty set; an unreadable or malformed one does too, with a
    /// warning.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let read = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<i64>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(error) => {
                    warn!(path = %path.display(), %error, "read marks unreadable, starting empty");
                    HashSet::new()
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no read marks yet");
                HashSet::new()
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "read marks unreadable, starting empty");
                HashSet::new()
            }
        };

        Self { path, read }
    }

    /// Whether the message id has been marked read.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.read.contains(&id)
    }

    /// Marks a batch of ids as read and persists when anything
    /// actually changed. Returns whether the set grew.
    pub fn mark_read(&mut self, ids: impl IntoIterator<Item = i64>) -> bool {
        let mut changed = false;
        for id in ids {
            changed |= self.read.insert(id);
        }
        if changed {
            self.persist();
        }
        changed
    }

    /// Number of marked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read.len()
    }

    /// Whether no id has been marked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(error) = fs::create_dir_all(parent) {
                    warn!(path = %self.path.display(), %error, "read marks not persisted");
                    return;
                }
            }
        }

        // Sorted for a stable file that diffs cleanly.
        let mut ids: Vec<i64> = self.read.iter().copied().collect();
        ids.sort_unstable();
        match serde_json::to_string(&ids) {
            Ok(raw) => {
                if let Err(error) = fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), %error, "read marks not persisted");
                }
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "read marks not persisted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("read_marks.json");

        let mut marks = ReadMarks::load(&path);
        assert!(marks.is_empty());
        assert!(marks.mark_read([10, 11]));
        drop(marks);

        let reloaded = ReadMarks::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(10));
        assert!(reloaded.contains(11));
        assert!(!reloaded.contains(12));
    }

    #[test]
    fn malformed_state_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("read_marks.json");
        fs::write(&path, "not json").unwrap();

        let marks = ReadMarks::load(&path);
        assert!(marks.is_empty());
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("read_marks.json");

        let mut marks = ReadMarks::load(&path);
        marks.mark_read([1]);

        assert!(path.exists());
    }

    #[test]
    fn mark_read_reports_whether_anything_changed() {
        let dir = tempfile::tempdir().unwrap();
        let mut marks = ReadMarks::load(dir.path().join("read_marks.json"));

        assert!(marks.mark_read([1, 2]));
        assert!(!marks.mark_read([1, 2]));
        assert!(marks.mark_read([2, 3]));
    }
}
