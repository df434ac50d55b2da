//! Serializable copies of (part of) a tree

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::entry::{Classification, Entry, EntryId};
use crate::tree::Tree;

#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub name: String,
    pub path: PathBuf,
    /// `directory` or `file`
    pub kind: &'static str,
    pub class: Classification,
    pub unsaved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntrySnapshot>,
}

impl Tree {
    /// Copies `id` and up to `depth` levels of loaded children.
    pub fn snapshot(&self, id: EntryId, depth: usize) -> Option<EntrySnapshot> {
        let entry = self.entry(id)?;

        let children = if depth == 0 {
            Vec::new()
        } else {
            self.children(id)
                .iter()
                .filter_map(|&child| self.snapshot(child, depth - 1))
                .collect()
        };

        let (dirty, error, loaded_at) = match entry {
            Entry::Dir(dir) => (
                Some(dir.dirty_count()),
                dir.error().map(str::to_string),
                dir.loaded_at(),
            ),
            Entry::File(_) => (None, None, None),
        };

        Some(EntrySnapshot {
            name: entry.name().to_string(),
            path: entry.path().to_path_buf(),
            kind: if entry.is_dir() { "directory" } else { "file" },
            class: entry.class(),
            unsaved: entry.shows_unsaved(),
            dirty,
            error,
            loaded_at,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::schedule::ScanQueue;
    use crate::sink::NullSink;
    use crate::testing::MemLister;
    use crate::tree::Tree;

    #[test]
    fn test_snapshot_serializes_loaded_levels() {
        let lister = MemLister::new();
        lister.add_file("/root/song.mp3");
        lister.add_file("/root/sub/inner.txt");

        let queue = ScanQueue::new();
        let mut tree = Tree::new(NullSink, queue.clone());
        let root = tree.load("/root", None).unwrap();
        queue.run_until_idle(&mut tree, &lister);

        let snapshot = tree.snapshot(root, 4).unwrap();
        assert_eq!(snapshot.children.len(), 2);
        assert_eq!(snapshot.children[0].name, "sub");
        // sub has not been scanned, so it has no children to copy
        assert!(snapshot.children[0].children.is_empty());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["name"], "root");
        assert_eq!(json["dirty"], 0);
        assert_eq!(json["kind"], "directory");
        assert_eq!(json["children"][1]["kind"], "file");
        assert_eq!(json["children"][0]["class"], "directory");
        assert_eq!(json["children"][1]["class"]["media"], "audio");
        assert!(json["children"][1].get("dirty").is_none());

        let shallow = tree.snapshot(root, 0).unwrap();
        assert!(shallow.children.is_empty());
    }
}
