//! Lazily loaded, incrementally refreshed mirror of a directory tree.
//!
//! A [`Tree`] is owned by one interactive thread. Directory listings run
//! elsewhere (see [`schedule`]) and are merged back with
//! [`Tree::complete`], keeping the identity of entries that did not change
//! so that selection and expansion state survive a refresh.

pub mod coalesce;
pub mod entry;
pub mod error;
pub mod merge;
pub mod resolve;
pub mod scanner;
pub mod schedule;
pub mod settings;
pub mod sink;
pub mod snapshot;
pub mod testing;
pub mod tree;
pub mod ui;
mod unsaved;

pub use coalesce::Waiter;
pub use entry::{Classification, Entry, EntryId, Lifecycle, MediaCategory};
pub use error::{ScanError, TreeError};
pub use resolve::Visitor;
pub use scanner::{FsLister, Lister};
pub use schedule::{ScanCompletion, ScanQueue, ScanScheduler, TokioScheduler};
pub use sink::TreeSink;
pub use tree::Tree;
