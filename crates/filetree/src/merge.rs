//! Diffing a directory's current children against a fresh listing

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;

use crate::entry::{Arena, EntryId};
use crate::scanner::Listed;

/// One structural step needed to bring a directory up to date.
///
/// Positions refer to the fresh listing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The existing entry survives with its identity intact.
    Kept {
        id: EntryId,
        listed: Listed,
        position: usize,
    },
    /// No entry existed under this name.
    Created { listed: Listed, position: usize },
    /// An entry existed under this name but with the other kind (file vs
    /// directory); it is destroyed and a new one takes its place.
    Replaced {
        old: EntryId,
        listed: Listed,
        position: usize,
    },
    /// The name is gone from disk.
    Removed { id: EntryId },
}

/// Computes the changes turning `old` into the children described by
/// `fresh`. Runs in O(n) map lookups. Duplicate names in `fresh` are
/// ignored after their first occurrence.
pub fn diff(arena: &Arena, old: &HashMap<OsString, EntryId>, fresh: Vec<Listed>) -> Vec<Change> {
    let mut changes = Vec::with_capacity(fresh.len());
    let mut seen: HashSet<OsString> = HashSet::with_capacity(fresh.len());
    let mut position = 0;

    for listed in fresh {
        if !seen.insert(listed.name.clone()) {
            continue;
        }

        let change = match old.get(&listed.name) {
            Some(&id) => match arena.get(id) {
                Some(entry) if entry.is_dir() == listed.is_dir() => Change::Kept {
                    id,
                    listed,
                    position,
                },
                Some(_) => Change::Replaced {
                    old: id,
                    listed,
                    position,
                },
                // The map pointed at a dead entry; treat the name as new.
                None => Change::Created { listed, position },
            },
            None => Change::Created { listed, position },
        };
        changes.push(change);
        position += 1;
    }

    for (name, &id) in old {
        if !seen.contains(name) {
            changes.push(Change::Removed { id });
        }
    }

    changes
}
