//! Linear edit history with branch-discard undo semantics.

use crate::media::ImageArtifact;

/// An ordered sequence of image snapshots with a cursor.
///
/// Index 0, when present, is the original upload (or a freshly generated
/// image) and is only replaced by [`History::load`]. Appending after an undo
/// discards the abandoned future entries first, so the history is always a
/// straight line, never a tree.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<ImageArtifact>,
    cursor: usize,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the history with a single entry and rewinds the cursor.
    /// Used for new uploads and freshly generated images.
    pub fn load(&mut self, artifact: ImageArtifact) {
        self.entries.clear();
        self.entries.push(artifact);
        self.cursor = 0;
    }

    /// Truncates everything past the cursor, appends the new entry, and
    /// moves the cursor onto it.
    pub fn append(&mut self, artifact: ImageArtifact) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(artifact);
        self.cursor = self.entries.len() - 1;
    }

    /// Steps the cursor back one entry. No-op at the origin.
    pub fn undo(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    /// Steps the cursor forward one entry. No-op at the newest entry.
    pub fn redo(&mut self) -> bool {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Rewinds the cursor to the original entry without discarding anything.
    /// No-op when there is at most one entry.
    pub fn reset(&mut self) -> bool {
        if self.entries.len() > 1 {
            self.cursor = 0;
            true
        } else {
            false
        }
    }

    /// Empties the history entirely. Used when switching to content that
    /// does not participate in the undo chain.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Returns the entry under the cursor, if any.
    pub fn current(&self) -> Option<&ImageArtifact> {
        self.entries.get(self.cursor)
    }

    /// Returns the original entry (index 0), if any.
    pub fn original(&self) -> Option<&ImageArtifact> {
        self.entries.first()
    }

    /// Returns true if a step back is possible.
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Returns true if a step forward is possible.
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the history holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
