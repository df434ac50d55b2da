//! Entry model: files and directories stored in a generational arena

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::coalesce::RefreshState;

/// Stable handle to an entry in the tree.
///
/// Ids are never reused: a slot freed by a destroyed entry gets a new
/// generation, so stale handles (e.g. from a scan that completes after its
/// directory was removed) simply fail to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Audio,
    Video,
    Image,
}

/// How a listed item is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Directory,
    Executable,
    Media(MediaCategory),
    Generic,
}

impl Classification {
    pub fn is_dir(self) -> bool {
        matches!(self, Classification::Directory)
    }

    pub fn icon(self) -> &'static str {
        match self {
            Classification::Directory => "📁",
            Classification::Executable => "⚙️",
            Classification::Media(MediaCategory::Audio) => "🎵",
            Classification::Media(MediaCategory::Video) => "🎬",
            Classification::Media(MediaCategory::Image) => "🖼️",
            Classification::Generic => "📄",
        }
    }
}

/// Whether a directory has been scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Loading,
    Ready,
}

#[derive(Debug)]
pub struct FileEntry {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) parent: Option<EntryId>,
    pub(crate) class: Classification,
    pub(crate) unsaved: bool,
}

impl FileEntry {
    pub fn class(&self) -> Classification {
        self.class
    }

    pub fn is_unsaved(&self) -> bool {
        self.unsaved
    }
}

#[derive(Debug)]
pub struct DirEntry {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) parent: Option<EntryId>,
    /// Keyed by on-disk basename
    pub(crate) children: HashMap<OsString, EntryId>,
    /// Display order from the last successful scan
    pub(crate) order: Vec<EntryId>,
    /// Number of distinct unsaved files below this directory
    pub(crate) dirty: usize,
    /// Set by a successful scan, cleared by a failed one
    pub(crate) loaded: bool,
    pub(crate) refresh: RefreshState,
    pub(crate) error: Option<String>,
    pub(crate) loaded_at: Option<DateTime<Utc>>,
}

impl DirEntry {
    pub fn lifecycle(&self) -> Lifecycle {
        if self.refresh.is_loading() {
            Lifecycle::Loading
        } else if self.loaded {
            Lifecycle::Ready
        } else {
            Lifecycle::Uninitialized
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty
    }

    pub fn has_unsaved(&self) -> bool {
        self.dirty > 0
    }

    pub fn child(&self, name: &OsStr) -> Option<EntryId> {
        self.children.get(name).copied()
    }

    /// Children in display order (directories first).
    pub fn children(&self) -> &[EntryId] {
        &self.order
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

#[derive(Debug)]
pub enum Entry {
    File(FileEntry),
    Dir(DirEntry),
}

impl Entry {
    pub(crate) fn new_file(
        path: PathBuf,
        name: String,
        parent: Option<EntryId>,
        class: Classification,
    ) -> Self {
        Entry::File(FileEntry {
            path,
            name,
            parent,
            class,
            unsaved: false,
        })
    }

    pub(crate) fn new_dir(path: PathBuf, name: String, parent: Option<EntryId>) -> Self {
        Entry::Dir(DirEntry {
            path,
            name,
            parent,
            children: HashMap::new(),
            order: Vec::new(),
            dirty: 0,
            loaded: false,
            refresh: RefreshState::Idle,
            error: None,
            loaded_at: None,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            Entry::File(f) => &f.path,
            Entry::Dir(d) => &d.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => &f.name,
            Entry::Dir(d) => &d.name,
        }
    }

    pub fn parent(&self) -> Option<EntryId> {
        match self {
            Entry::File(f) => f.parent,
            Entry::Dir(d) => d.parent,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Dir(_))
    }

    pub fn class(&self) -> Classification {
        match self {
            Entry::File(f) => f.class,
            Entry::Dir(_) => Classification::Directory,
        }
    }

    /// The unsaved marker shown for this entry: the file's own flag, or
    /// "has unsaved descendants" for a directory.
    pub fn shows_unsaved(&self) -> bool {
        match self {
            Entry::File(f) => f.unsaved,
            Entry::Dir(d) => d.dirty > 0,
        }
    }

    pub fn as_dir(&self) -> Option<&DirEntry> {
        match self {
            Entry::Dir(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Dir(_) => None,
        }
    }

    pub(crate) fn as_dir_mut(&mut self) -> Option<&mut DirEntry> {
        match self {
            Entry::Dir(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    pub(crate) fn as_file_mut(&mut self) -> Option<&mut FileEntry> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Dir(_) => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Owns every entry of a tree. Directories refer to their children (and
/// children to their parent) by [`EntryId`] only.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: Entry) -> EntryId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return EntryId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        EntryId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(entry)
    }

    pub fn dir(&self, id: EntryId) -> Option<&DirEntry> {
        self.get(id).and_then(Entry::as_dir)
    }

    pub fn dir_mut(&mut self, id: EntryId) -> Option<&mut DirEntry> {
        self.get_mut(id).and_then(Entry::as_dir_mut)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
