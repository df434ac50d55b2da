//! Types shared by the browser and the continuations it hands to the tree

use crate::entry::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Browse,
    Help,
    /// Typing a path to jump to
    Jump,
}

/// Results written by tree continuations, picked up on the next tick.
#[derive(Debug, Default)]
pub struct Pending {
    /// Directories passed through by a jump, to be shown open
    pub expand: Vec<EntryId>,
    pub select: Option<EntryId>,
    pub message: Option<String>,
}

