//! Notifications from the tree to whatever presents it

use crate::entry::{Entry, EntryId};

/// Receives structural and state changes as they are applied to a
/// [`Tree`](crate::tree::Tree).
///
/// Removal is only reported for the top-most destroyed entry; its
/// descendants go with it.
pub trait TreeSink {
    fn entry_created(
        &mut self,
        _id: EntryId,
        _entry: &Entry,
        _parent: Option<EntryId>,
        _position: usize,
    ) {
    }

    /// An existing entry survived a rescan, now at `position`.
    fn entry_kept(&mut self, _id: EntryId, _position: usize) {}

    /// A kept entry's presentation changed (e.g. a file became executable).
    fn entry_updated(&mut self, _id: EntryId, _entry: &Entry) {}

    /// `old` was destroyed because its name now refers to the other kind.
    fn entry_replaced(
        &mut self,
        old: EntryId,
        new: EntryId,
        entry: &Entry,
        parent: EntryId,
        position: usize,
    ) {
        self.entry_removed(old);
        self.entry_created(new, entry, Some(parent), position);
    }

    fn entry_removed(&mut self, _id: EntryId) {}

    /// Final display order of a directory after a successful scan.
    fn children_ordered(&mut self, _dir: EntryId, _children: &[EntryId]) {}

    /// A scan of `dir` failed; its children were cleared.
    fn entry_error(&mut self, _dir: EntryId, _message: &str) {}

    /// A previously failed directory scanned successfully.
    fn error_cleared(&mut self, _dir: EntryId) {}

    /// `busy` is true while a scan of the directory is in flight.
    fn busy_changed(&mut self, _id: EntryId, _busy: bool) {}

    fn unsaved_changed(&mut self, _id: EntryId, _unsaved: bool) {}
}

/// Discards every notification.
#[derive(Debug, Default)]
pub struct NullSink;

impl TreeSink for NullSink {}

/// Notifications as plain values, for recording sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    Created {
        id: EntryId,
        name: String,
        parent: Option<EntryId>,
        position: usize,
    },
    Kept {
        id: EntryId,
        position: usize,
    },
    Updated {
        id: EntryId,
    },
    Replaced {
        old: EntryId,
        new: EntryId,
        position: usize,
    },
    Removed {
        id: EntryId,
    },
    Ordered {
        dir: EntryId,
        children: Vec<EntryId>,
    },
    Error {
        dir: EntryId,
        message: String,
    },
    ErrorCleared {
        dir: EntryId,
    },
    Busy {
        id: EntryId,
        busy: bool,
    },
    Unsaved {
        id: EntryId,
        unsaved: bool,
    },
}

/// Appends every notification to a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: std::rc::Rc<std::cell::RefCell<Vec<TreeEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TreeEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<TreeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    fn push(&self, event: TreeEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl TreeSink for RecordingSink {
    fn entry_created(
        &mut self,
        id: EntryId,
        entry: &Entry,
        parent: Option<EntryId>,
        position: usize,
    ) {
        self.push(TreeEvent::Created {
            id,
            name: entry.name().to_string(),
            parent,
            position,
        });
    }

    fn entry_kept(&mut self, id: EntryId, position: usize) {
        self.push(TreeEvent::Kept { id, position });
    }

    fn entry_updated(&mut self, id: EntryId, _entry: &Entry) {
        self.push(TreeEvent::Updated { id });
    }

    fn entry_replaced(
        &mut self,
        old: EntryId,
        new: EntryId,
        _entry: &Entry,
        _parent: EntryId,
        position: usize,
    ) {
        self.push(TreeEvent::Replaced { old, new, position });
    }

    fn entry_removed(&mut self, id: EntryId) {
        self.push(TreeEvent::Removed { id });
    }

    fn children_ordered(&mut self, dir: EntryId, children: &[EntryId]) {
        self.push(TreeEvent::Ordered {
            dir,
            children: children.to_vec(),
        });
    }

    fn entry_error(&mut self, dir: EntryId, message: &str) {
        self.push(TreeEvent::Error {
            dir,
            message: message.to_string(),
        });
    }

    fn error_cleared(&mut self, dir: EntryId) {
        self.push(TreeEvent::ErrorCleared { dir });
    }

    fn busy_changed(&mut self, id: EntryId, busy: bool) {
        self.push(TreeEvent::Busy { id, busy });
    }

    fn unsaved_changed(&mut self, id: EntryId, unsaved: bool) {
        self.push(TreeEvent::Unsaved { id, unsaved });
    }
}
