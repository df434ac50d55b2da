//! The synchronized tree: ownership, structural edits and lookups

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::path::{Component, Path};
use tracing::{info, warn};

use crate::coalesce::Waiter;
use crate::entry::{Arena, DirEntry, Entry, EntryId, Lifecycle};
use crate::error::{ScanError, TreeError};
use crate::merge::{self, Change};
use crate::scanner::Listed;
use crate::schedule::ScanScheduler;
use crate::sink::TreeSink;

/// A lazily loaded mirror of a directory tree.
///
/// Every method must be called from the interactive thread. Scans are
/// handed to the [`ScanScheduler`] and come back through
/// [`Tree::complete`]; nothing here blocks on the filesystem.
pub struct Tree {
    pub(crate) arena: Arena,
    pub(crate) root: Option<EntryId>,
    pub(crate) sink: Box<dyn TreeSink>,
    pub(crate) scheduler: Box<dyn ScanScheduler>,
    pub(crate) next_ticket: u64,
    /// Waiters orphaned by destroyed directories, run once the current
    /// mutation has finished
    pub(crate) deferred: VecDeque<Waiter>,
}

impl Tree {
    pub fn new(sink: impl TreeSink + 'static, scheduler: impl ScanScheduler + 'static) -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            sink: Box::new(sink),
            scheduler: Box::new(scheduler),
            next_ticket: 0,
            deferred: VecDeque::new(),
        }
    }

    /// Replaces the tree with a fresh, unloaded root at `path` and starts
    /// loading it. `done` runs once the first scan finishes.
    pub fn load(&mut self, path: impl AsRef<Path>, done: Option<Waiter>) -> Result<EntryId, TreeError> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(TreeError::NotAbsolute(path.to_path_buf()));
        }

        if let Some(old) = self.root.take() {
            self.drop_subtree(old);
            self.sink.entry_removed(old);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let root = self.arena.insert(Entry::new_dir(path.to_path_buf(), name, None));
        self.root = Some(root);

        if let Some(entry) = self.arena.get(root) {
            self.sink.entry_created(root, entry, None, 0);
        }

        info!(path = %path.display(), "loading tree");
        self.refresh(root, done);
        Ok(root)
    }

    pub fn root(&self) -> Option<EntryId> {
        self.root
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root.and_then(|root| self.path_of(root))
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.arena.get(id)
    }

    pub fn dir(&self, id: EntryId) -> Option<&DirEntry> {
        self.arena.dir(id)
    }

    pub fn path_of(&self, id: EntryId) -> Option<&Path> {
        self.arena.get(id).map(Entry::path)
    }

    /// Children of a directory in display order; empty for files and
    /// unknown ids.
    pub fn children(&self, id: EntryId) -> &[EntryId] {
        self.arena.dir(id).map(DirEntry::children).unwrap_or(&[])
    }

    pub fn lifecycle(&self, id: EntryId) -> Option<Lifecycle> {
        self.arena.dir(id).map(DirEntry::lifecycle)
    }

    pub fn dirty_count(&self, id: EntryId) -> usize {
        self.arena.dir(id).map_or(0, DirEntry::dirty_count)
    }

    pub fn is_unsaved(&self, id: EntryId) -> bool {
        self.arena.get(id).is_some_and(Entry::shows_unsaved)
    }

    /// Number of live entries, root included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// `path` relative to the root. Paths outside the root (or any path
    /// when nothing is loaded) come back unchanged; the root itself is `.`.
    pub fn relative_path(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        let Some(root) = self.root_path() else {
            return path.display().to_string();
        };

        match path.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }

    /// Finds an entry among what is already loaded. Never triggers a scan;
    /// see [`Tree::resolve_path`] for the lazy variant.
    pub fn lookup(&self, path: impl AsRef<Path>) -> Option<EntryId> {
        let mut current = self.root?;
        for part in self.components(path.as_ref())? {
            let dir = self.arena.dir(current)?;
            if !dir.loaded {
                return None;
            }
            current = dir.child(&part)?;
        }
        Some(current)
    }

    /// Splits `path` into names below the root. `None` if the path leaves
    /// the root.
    pub(crate) fn components(&self, path: &Path) -> Option<Vec<OsString>> {
        let rel = if path.is_absolute() {
            path.strip_prefix(self.root_path()?).ok()?
        } else {
            path
        };

        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_os_string()),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(parts)
    }

    /// Replaces the children of `dir` with a successful scan result.
    pub(crate) fn apply_listing(&mut self, dir: EntryId, listing: Vec<Listed>) {
        let old = match self.arena.dir_mut(dir) {
            Some(d) => {
                d.order.clear();
                std::mem::take(&mut d.children)
            }
            None => return,
        };

        let changes = merge::diff(&self.arena, &old, listing);
        let mut children = HashMap::with_capacity(changes.len());
        let mut order = Vec::with_capacity(changes.len());

        for change in changes {
            match change {
                Change::Kept {
                    id,
                    listed,
                    position,
                } => {
                    let updated = match self.arena.get_mut(id).and_then(Entry::as_file_mut) {
                        Some(file) if file.class != listed.class => {
                            file.class = listed.class;
                            true
                        }
                        _ => false,
                    };
                    if updated {
                        if let Some(entry) = self.arena.get(id) {
                            self.sink.entry_updated(id, entry);
                        }
                    }
                    self.sink.entry_kept(id, position);
                    children.insert(listed.name, id);
                    order.push(id);
                }
                Change::Created { listed, position } => {
                    let id = self.create_child(dir, &listed);
                    if let Some(entry) = self.arena.get(id) {
                        self.sink.entry_created(id, entry, Some(dir), position);
                    }
                    children.insert(listed.name, id);
                    order.push(id);
                }
                Change::Replaced {
                    old,
                    listed,
                    position,
                } => {
                    self.destroy(old);
                    let id = self.create_child(dir, &listed);
                    if let Some(entry) = self.arena.get(id) {
                        self.sink.entry_replaced(old, id, entry, dir, position);
                    }
                    children.insert(listed.name, id);
                    order.push(id);
                }
                Change::Removed { id } => {
                    self.destroy(id);
                    self.sink.entry_removed(id);
                }
            }
        }

        let Some(d) = self.arena.dir_mut(dir) else {
            return;
        };
        d.children = children;
        d.order = order;
        d.loaded = true;
        d.loaded_at = Some(Utc::now());
        let had_error = d.error.take().is_some();

        if had_error {
            self.sink.error_cleared(dir);
        }
        if let Some(d) = self.arena.dir(dir) {
            self.sink.children_ordered(dir, &d.order);
        }
    }

    /// Clears `dir` after a failed scan and records the error in its place.
    pub(crate) fn apply_error(&mut self, dir: EntryId, err: &ScanError) {
        let message = err.to_string();
        warn!(path = %err.path().display(), error = %message, "scan failed");

        let order = match self.arena.dir_mut(dir) {
            Some(d) => {
                d.children.clear();
                d.loaded = false;
                d.error = Some(message.clone());
                std::mem::take(&mut d.order)
            }
            None => return,
        };

        for child in order {
            self.destroy(child);
            self.sink.entry_removed(child);
        }
        self.sink.entry_error(dir, &message);
    }

    fn create_child(&mut self, parent: EntryId, listed: &Listed) -> EntryId {
        let path = match self.arena.get(parent) {
            Some(entry) => entry.path().join(&listed.name),
            None => listed.name.clone().into(),
        };

        let name = listed.display_name();
        let entry = if listed.is_dir() {
            Entry::new_dir(path, name, Some(parent))
        } else {
            Entry::new_file(path, name, Some(parent), listed.class)
        };
        self.arena.insert(entry)
    }

    /// Destroys an entry and everything below it. Unsaved files lost this
    /// way are subtracted from the ancestors' dirty counts.
    pub(crate) fn destroy(&mut self, id: EntryId) {
        let Some(entry) = self.arena.get(id) else {
            return;
        };

        let lost = match entry {
            Entry::File(file) => usize::from(file.unsaved),
            Entry::Dir(dir) => dir.dirty,
        };
        let parent = entry.parent();
        let key = entry.path().file_name().map(|n| n.to_os_string());

        if let Some(parent) = parent {
            if lost > 0 {
                self.adjust_dirty(parent, -(lost as isize));
            }
            if let Some(d) = self.arena.dir_mut(parent) {
                if let Some(key) = key.filter(|k| d.children.get(k) == Some(&id)) {
                    d.children.remove(&key);
                }
                d.order.retain(|&child| child != id);
            }
        }

        self.drop_subtree(id);
    }

    /// Frees a subtree without any bookkeeping on its ancestors. Waiters of
    /// directories that were still loading are deferred, not dropped.
    fn drop_subtree(&mut self, id: EntryId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(Entry::Dir(dir)) = self.arena.remove(id) {
                stack.extend(dir.children.into_values());
                if let Some(waiters) = dir.refresh.into_waiters() {
                    self.deferred.extend(waiters);
                }
            }
        }
    }

    pub(crate) fn run_deferred(&mut self) {
        while let Some(waiter) = self.deferred.pop_front() {
            waiter(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Classification;
    use crate::schedule::ScanQueue;
    use crate::sink::{NullSink, RecordingSink, TreeEvent};
    use crate::testing::MemLister;

    fn loaded_tree(lister: &MemLister) -> (Tree, ScanQueue) {
        let queue = ScanQueue::new();
        let mut tree = Tree::new(NullSink, queue.clone());
        tree.load("/root", None).unwrap();
        queue.run_until_idle(&mut tree, lister);
        (tree, queue)
    }

    fn child_names(tree: &Tree, id: EntryId) -> Vec<String> {
        tree.children(id)
            .iter()
            .map(|&c| tree.entry(c).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_load_rejects_relative_path() {
        let mut tree = Tree::new(NullSink, ScanQueue::new());
        assert!(matches!(
            tree.load("relative/dir", None),
            Err(TreeError::NotAbsolute(_))
        ));
        assert!(tree.root().is_none());
    }

    #[test]
    fn test_load_lists_directories_first() {
        let lister = MemLister::new();
        lister.add_file("/root/a.txt");
        lister.add_dir("/root/b");
        lister.add_file("/root/b/c.txt");

        let (tree, _queue) = loaded_tree(&lister);
        let root = tree.root().unwrap();

        assert_eq!(tree.lifecycle(root), Some(Lifecycle::Ready));
        assert_eq!(child_names(&tree, root), vec!["b", "a.txt"]);

        // b is known but not scanned yet
        let b = tree.lookup("b").unwrap();
        assert_eq!(tree.lifecycle(b), Some(Lifecycle::Uninitialized));
        assert_eq!(tree.path_of(b), Some(Path::new("/root/b")));
    }

    #[test]
    fn test_rescan_preserves_identity() {
        let lister = MemLister::new();
        lister.add_dir("/root/docs");
        lister.add_file("/root/notes.md");
        lister.add_file("/root/old.md");

        let (mut tree, queue) = loaded_tree(&lister);
        let root = tree.root().unwrap();
        let docs = tree.lookup("docs").unwrap();
        let notes = tree.lookup("notes.md").unwrap();
        let old = tree.lookup("old.md").unwrap();

        lister.remove("/root/old.md");
        lister.add_file("/root/new.md");
        tree.refresh(root, None);
        queue.run_until_idle(&mut tree, &lister);

        assert_eq!(tree.lookup("docs"), Some(docs));
        assert_eq!(tree.lookup("notes.md"), Some(notes));
        assert!(tree.entry(old).is_none());
        assert!(tree.lookup("old.md").is_none());
        assert_eq!(child_names(&tree, root), vec!["docs", "notes.md", "new.md"]);
    }

    #[test]
    fn test_kind_change_replaces_entry() {
        let lister = MemLister::new();
        lister.add_file("/root/thing");

        let (mut tree, queue) = loaded_tree(&lister);
        let root = tree.root().unwrap();
        let file = tree.lookup("thing").unwrap();

        lister.remove("/root/thing");
        lister.add_dir("/root/thing");
        tree.refresh(root, None);
        queue.run_until_idle(&mut tree, &lister);

        let dir = tree.lookup("thing").unwrap();
        assert_ne!(file, dir);
        assert!(tree.entry(file).is_none());
        assert!(tree.entry(dir).unwrap().is_dir());
    }

    #[test]
    fn test_class_change_updates_in_place() {
        let lister = MemLister::new();
        lister.add_file("/root/run");

        let sink = RecordingSink::new();
        let queue = ScanQueue::new();
        let mut tree = Tree::new(sink.clone(), queue.clone());
        let root = tree.load("/root", None).unwrap();
        queue.run_until_idle(&mut tree, &lister);
        let run = tree.lookup("run").unwrap();
        sink.take();

        lister.set_mode("/root/run", 0o755);
        tree.refresh(root, None);
        queue.run_until_idle(&mut tree, &lister);

        assert_eq!(tree.lookup("run"), Some(run));
        assert_eq!(tree.entry(run).unwrap().class(), Classification::Executable);
        assert!(sink.events().contains(&TreeEvent::Updated { id: run }));
    }

    #[test]
    fn test_removing_directory_drops_descendants() {
        let lister = MemLister::new();
        lister.add_dir("/root/a");
        lister.add_dir("/root/a/b");
        lister.add_file("/root/a/b/c.txt");

        let (mut tree, queue) = loaded_tree(&lister);
        let root = tree.root().unwrap();
        let a = tree.lookup("a").unwrap();
        tree.init(a, None);
        queue.run_until_idle(&mut tree, &lister);
        let b = tree.lookup("a/b").unwrap();
        tree.init(b, None);
        queue.run_until_idle(&mut tree, &lister);
        assert_eq!(tree.len(), 4);

        lister.remove("/root/a");
        tree.refresh(root, None);
        queue.run_until_idle(&mut tree, &lister);

        assert_eq!(tree.len(), 1);
        assert!(tree.entry(b).is_none());
    }

    #[test]
    fn test_scan_error_replaces_children() {
        let lister = MemLister::new();
        lister.add_file("/root/a.txt");

        let sink = RecordingSink::new();
        let queue = ScanQueue::new();
        let mut tree = Tree::new(sink.clone(), queue.clone());
        let root = tree.load("/root", None).unwrap();
        queue.run_until_idle(&mut tree, &lister);
        let a = tree.lookup("a.txt").unwrap();
        sink.take();

        lister.fail("/root", "permission denied");
        tree.refresh(root, None);
        queue.run_until_idle(&mut tree, &lister);

        assert!(tree.children(root).is_empty());
        assert_eq!(tree.lifecycle(root), Some(Lifecycle::Uninitialized));
        let message = tree.dir(root).unwrap().error().unwrap().to_string();
        assert!(message.contains("permission denied"));

        let events = sink.events();
        assert!(events.contains(&TreeEvent::Removed { id: a }));
        assert!(events.contains(&TreeEvent::Error { dir: root, message }));

        // A later refresh retries and recovers
        lister.heal("/root");
        tree.refresh(root, None);
        queue.run_until_idle(&mut tree, &lister);
        assert_eq!(tree.lifecycle(root), Some(Lifecycle::Ready));
        assert!(tree.dir(root).unwrap().error().is_none());
        assert!(sink.events().contains(&TreeEvent::ErrorCleared { dir: root }));
    }

    #[test]
    fn test_relative_path() {
        let lister = MemLister::new();
        let (tree, _queue) = loaded_tree(&lister);

        assert_eq!(tree.relative_path("/root/b/c.txt"), "b/c.txt");
        assert_eq!(tree.relative_path("/root"), ".");
        assert_eq!(tree.relative_path("/elsewhere/x"), "/elsewhere/x");
        assert_eq!(tree.relative_path("/rootless/x"), "/rootless/x");
    }

    #[test]
    fn test_reload_replaces_root() {
        let lister = MemLister::new();
        lister.add_file("/root/a.txt");
        lister.add_file("/other/z.txt");

        let (mut tree, queue) = loaded_tree(&lister);
        let first = tree.root().unwrap();

        let second = tree.load("/other", None).unwrap();
        queue.run_until_idle(&mut tree, &lister);

        assert_ne!(first, second);
        assert!(tree.entry(first).is_none());
        assert_eq!(child_names(&tree, second), vec!["z.txt"]);
        assert_eq!(tree.len(), 2);
    }
}
