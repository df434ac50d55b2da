//! Unsaved markers and their per-directory aggregate

use std::path::Path;
use tracing::warn;

use crate::entry::{Entry, EntryId};
use crate::tree::Tree;

impl Tree {
    /// Marks the file at `path` as unsaved (or saved), loading directories
    /// on the way if needed. Setting the state a file already has does
    /// nothing.
    pub fn set_unsaved(&mut self, path: impl AsRef<Path>, unsaved: bool) {
        self.resolve_path(
            path,
            Box::new(move |tree: &mut Tree, entry| {
                if let Some(id) = entry {
                    if tree.entry(id).is_some_and(|e| !e.is_dir()) {
                        tree.mark_unsaved(id, unsaved);
                    }
                }
                true
            }),
        );
    }

    /// Sets the unsaved flag of a file entry and updates the dirty count of
    /// every directory above it. Returns whether anything changed.
    pub fn mark_unsaved(&mut self, id: EntryId, unsaved: bool) -> bool {
        let Some(file) = self.arena.get_mut(id).and_then(Entry::as_file_mut) else {
            return false;
        };
        if file.unsaved == unsaved {
            return false;
        }
        file.unsaved = unsaved;
        let parent = file.parent;

        self.sink.unsaved_changed(id, unsaved);
        if let Some(parent) = parent {
            self.adjust_dirty(parent, if unsaved { 1 } else { -1 });
        }
        true
    }

    /// Adds `delta` to the dirty count of `from` and all of its ancestors,
    /// clamping at zero.
    pub(crate) fn adjust_dirty(&mut self, from: EntryId, delta: isize) {
        let mut current = Some(from);
        while let Some(id) = current {
            let Some(dir) = self.arena.dir_mut(id) else {
                break;
            };

            let before = dir.dirty > 0;
            if delta >= 0 {
                dir.dirty += delta as usize;
            } else {
                let sub = delta.unsigned_abs();
                if sub > dir.dirty {
                    warn!(path = %dir.path.display(), dirty = dir.dirty, sub, "dirty count underflow");
                }
                dir.dirty = dir.dirty.saturating_sub(sub);
            }
            let after = dir.dirty > 0;
            current = dir.parent;

            if before != after {
                self.sink.unsaved_changed(id, after);
            }
        }
    }
}
