//! Row model kept in sync with the tree through [`TreeSink`] notifications

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::entry::{Classification, Entry, EntryId};
use crate::sink::TreeSink;

/// What the browser knows about one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub name: String,
    pub class: Classification,
    pub parent: Option<EntryId>,
    pub unsaved: bool,
    pub busy: bool,
    pub error: Option<String>,
    /// Display order, directories only
    pub children: Vec<EntryId>,
}

impl Row {
    fn new(entry: &Entry, parent: Option<EntryId>) -> Self {
        Self {
            name: entry.name().to_string(),
            class: entry.class(),
            parent,
            unsaved: entry.shows_unsaved(),
            busy: false,
            error: None,
            children: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.class.is_dir()
    }

    pub fn icon(&self) -> &'static str {
        self.class.icon()
    }

    fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// A row in flattened display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow {
    pub id: EntryId,
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct RowModel {
    rows: HashMap<EntryId, Row>,
    root: Option<EntryId>,
}

impl RowModel {
    pub fn get(&self, id: EntryId) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows reachable from the root through `expanded` directories, depth
    /// first. The root is always shown and always open.
    pub fn visible(&self, expanded: &HashSet<EntryId>, show_hidden: bool) -> Vec<VisibleRow> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };

        let mut stack = vec![VisibleRow { id: root, depth: 0 }];
        while let Some(visible) = stack.pop() {
            let Some(row) = self.rows.get(&visible.id) else {
                continue;
            };
            out.push(visible);

            if visible.id != root && !expanded.contains(&visible.id) {
                continue;
            }
            for &child in row.children.iter().rev() {
                let shown = self
                    .rows
                    .get(&child)
                    .is_some_and(|c| show_hidden || !c.is_hidden());
                if shown {
                    stack.push(VisibleRow {
                        id: child,
                        depth: visible.depth + 1,
                    });
                }
            }
        }
        out
    }

    fn remove_subtree(&mut self, id: EntryId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(row) = self.rows.remove(&id) {
                stack.extend(row.children);
            }
        }
    }
}

/// Shared handle to a [`RowModel`]. One clone goes into the tree as its
/// sink, the browser reads through another.
#[derive(Debug, Clone, Default)]
pub struct SharedRows(Rc<RefCell<RowModel>>);

impl SharedRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, RowModel> {
        self.0.borrow()
    }

    fn with<R>(&self, f: impl FnOnce(&mut RowModel) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    fn with_row(&self, id: EntryId, f: impl FnOnce(&mut Row)) {
        self.with(|model| {
            if let Some(row) = model.rows.get_mut(&id) {
                f(row);
            }
        });
    }
}

impl TreeSink for SharedRows {
    fn entry_created(
        &mut self,
        id: EntryId,
        entry: &Entry,
        parent: Option<EntryId>,
        position: usize,
    ) {
        self.with(|model| {
            model.rows.insert(id, Row::new(entry, parent));
            match parent {
                Some(parent) => {
                    if let Some(p) = model.rows.get_mut(&parent) {
                        let at = position.min(p.children.len());
                        p.children.insert(at, id);
                    }
                }
                None => model.root = Some(id),
            }
        });
    }

    fn entry_updated(&mut self, id: EntryId, entry: &Entry) {
        let class = entry.class();
        self.with_row(id, |row| row.class = class);
    }

    fn entry_removed(&mut self, id: EntryId) {
        self.with(|model| {
            let parent = model.rows.get(&id).and_then(|r| r.parent);
            if let Some(p) = parent.and_then(|p| model.rows.get_mut(&p)) {
                p.children.retain(|&c| c != id);
            }
            if model.root == Some(id) {
                model.root = None;
            }
            model.remove_subtree(id);
        });
    }

    fn children_ordered(&mut self, dir: EntryId, children: &[EntryId]) {
        self.with_row(dir, |row| row.children = children.to_vec());
    }

    fn entry_error(&mut self, dir: EntryId, message: &str) {
        let message = message.to_string();
        self.with_row(dir, |row| {
            row.children.clear();
            row.error = Some(message);
        });
    }

    fn error_cleared(&mut self, dir: EntryId) {
        self.with_row(dir, |row| row.error = None);
    }

    fn busy_changed(&mut self, id: EntryId, busy: bool) {
        self.with_row(id, |row| row.busy = busy);
    }

    fn unsaved_changed(&mut self, id: EntryId, unsaved: bool) {
        self.with_row(id, |row| row.unsaved = unsaved);
    }
}
