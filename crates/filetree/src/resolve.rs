//! Path resolution with lazy directory loading

use std::ffi::OsString;
use std::path::Path;

use crate::entry::{EntryId, Lifecycle};
use crate::tree::Tree;

/// Called for every directory passed through and once for the final entry,
/// or once with `None` when the path cannot be resolved. Returning `false`
/// from an intermediate directory stops the walk.
pub type Visitor = Box<dyn FnMut(&mut Tree, Option<EntryId>) -> bool>;

impl Tree {
    /// Walks `path` (absolute, or relative to the root) down the tree.
    ///
    /// Directories on the way that have not been loaded yet are loaded
    /// first; the walk then resumes at the same component instead of
    /// starting over, so only directories on the path are scanned.
    pub fn resolve_path(&mut self, path: impl AsRef<Path>, mut visitor: Visitor) {
        let (Some(root), Some(parts)) = (self.root, self.components(path.as_ref())) else {
            visitor(self, None);
            return;
        };

        if parts.is_empty() {
            visitor(self, Some(root));
            return;
        }

        self.walk(root, parts, 0, visitor, false);
    }

    fn walk(
        &mut self,
        mut dir: EntryId,
        parts: Vec<OsString>,
        mut index: usize,
        mut visitor: Visitor,
        mut resumed: bool,
    ) {
        loop {
            match self.lifecycle(dir) {
                None => {
                    visitor(self, None);
                    return;
                }
                Some(Lifecycle::Ready) => {}
                // Loaded once and still not ready: the scan failed.
                Some(Lifecycle::Uninitialized) if resumed => {
                    visitor(self, None);
                    return;
                }
                Some(_) => {
                    self.init(
                        dir,
                        Some(Box::new(move |tree: &mut Tree| {
                            tree.walk(dir, parts, index, visitor, true)
                        })),
                    );
                    return;
                }
            }
            resumed = false;

            let Some(child) = self.dir(dir).and_then(|d| d.child(&parts[index])) else {
                visitor(self, None);
                return;
            };

            if index == parts.len() - 1 {
                visitor(self, Some(child));
                return;
            }

            // A file in the middle of the path
            if self.dir(child).is_none() {
                visitor(self, None);
                return;
            }

            if !visitor(self, Some(child)) {
                return;
            }
            dir = child;
            index += 1;
        }
    }
}
