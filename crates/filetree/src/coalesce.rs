//! Per-directory refresh state: one scan in flight, many waiters

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use crate::entry::{EntryId, Lifecycle};
use crate::schedule::{ScanCompletion, ScanJob, ScanTicket};
use crate::tree::Tree;

/// A continuation run on the interactive thread once a refresh finishes.
pub type Waiter = Box<dyn FnOnce(&mut Tree)>;

/// Refresh state of one directory.
///
/// `Idle --refresh--> Loading` schedules exactly one scan.
/// `Loading --refresh--> Loading` only queues the caller's waiter.
/// `Loading --completion--> Idle` applies the result and runs every waiter.
pub(crate) enum RefreshState {
    Idle,
    Loading(InFlight),
}

pub(crate) struct InFlight {
    pub(crate) ticket: ScanTicket,
    pub(crate) waiters: Vec<Waiter>,
}

impl RefreshState {
    pub(crate) fn is_loading(&self) -> bool {
        matches!(self, RefreshState::Loading(_))
    }

    pub(crate) fn into_waiters(self) -> Option<Vec<Waiter>> {
        match self {
            RefreshState::Idle => None,
            RefreshState::Loading(in_flight) => Some(in_flight.waiters),
        }
    }
}

impl fmt::Debug for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshState::Idle => write!(f, "Idle"),
            RefreshState::Loading(in_flight) => f
                .debug_struct("Loading")
                .field("ticket", &in_flight.ticket)
                .field("waiters", &in_flight.waiters.len())
                .finish(),
        }
    }
}

impl Tree {
    /// Rescans `dir`. If a scan of `dir` is already running, no new scan is
    /// started and `done` runs when the running one finishes.
    ///
    /// `done` also runs (right away) if `dir` no longer exists.
    pub fn refresh(&mut self, dir: EntryId, done: Option<Waiter>) {
        self.start_refresh(dir, done);
        self.run_deferred();
    }

    /// Loads `dir` unless it is already loaded, then runs `done`.
    pub fn init(&mut self, dir: EntryId, done: Option<Waiter>) {
        match self.lifecycle(dir) {
            Some(Lifecycle::Ready) => {
                if let Some(done) = done {
                    done(self);
                }
            }
            _ => self.refresh(dir, done),
        }
    }

    /// Refreshes `dir`, then every subdirectory that had been loaded before,
    /// recursively. `done` runs once after the last of those scans.
    pub fn refresh_loaded(&mut self, dir: EntryId, done: Option<Waiter>) {
        self.refresh(
            dir,
            Some(Box::new(move |tree: &mut Tree| {
                let loaded: Vec<EntryId> = tree
                    .children(dir)
                    .iter()
                    .copied()
                    .filter(|&child| tree.dir(child).is_some_and(|d| d.loaded))
                    .collect();

                fan_out(tree, loaded, done, |tree, child, waiter| {
                    tree.refresh_loaded(child, Some(waiter))
                });
            })),
        );
    }

    /// Loads `dir` and its subdirectories down to `depth` levels below it.
    pub fn init_to_depth(&mut self, dir: EntryId, depth: usize, done: Option<Waiter>) {
        self.init(
            dir,
            Some(Box::new(move |tree: &mut Tree| {
                let subdirs: Vec<EntryId> = if depth == 0 {
                    Vec::new()
                } else {
                    tree.children(dir)
                        .iter()
                        .copied()
                        .filter(|&child| tree.dir(child).is_some())
                        .collect()
                };

                fan_out(tree, subdirs, done, move |tree, child, waiter| {
                    tree.init_to_depth(child, depth - 1, Some(waiter))
                });
            })),
        );
    }

    /// Applies a finished scan. Completions for directories that were
    /// destroyed, or that were superseded, are discarded.
    pub fn complete(&mut self, completion: ScanCompletion) {
        let ScanCompletion {
            dir,
            ticket,
            result,
        } = completion;

        let in_flight = match self.arena.dir_mut(dir) {
            Some(d) => match std::mem::replace(&mut d.refresh, RefreshState::Idle) {
                RefreshState::Loading(in_flight) if in_flight.ticket == ticket => in_flight,
                other => {
                    d.refresh = other;
                    debug!(path = %d.path.display(), "discarding superseded scan");
                    return;
                }
            },
            None => {
                debug!(%dir, "discarding scan of a removed directory");
                return;
            }
        };

        match result {
            Ok(listing) => {
                debug!(%dir, entries = listing.len(), "scan complete");
                self.apply_listing(dir, listing);
            }
            Err(err) => self.apply_error(dir, &err),
        }
        self.sink.busy_changed(dir, false);

        for waiter in in_flight.waiters {
            waiter(self);
        }
        self.run_deferred();
    }

    fn start_refresh(&mut self, dir: EntryId, done: Option<Waiter>) {
        let ticket = ScanTicket(self.next_ticket);

        let Some(d) = self.arena.dir_mut(dir) else {
            debug!(%dir, "refresh of a missing directory");
            self.deferred.extend(done);
            return;
        };

        if let RefreshState::Loading(in_flight) = &mut d.refresh {
            in_flight.waiters.extend(done);
            debug!(
                path = %d.path.display(),
                waiters = in_flight.waiters.len(),
                "joining in-flight scan"
            );
            return;
        }

        d.refresh = RefreshState::Loading(InFlight {
            ticket,
            waiters: done.into_iter().collect(),
        });
        let path = d.path.clone();
        self.next_ticket += 1;

        debug!(path = %path.display(), "starting scan");
        self.sink.busy_changed(dir, true);
        self.scheduler.schedule(ScanJob { dir, ticket, path });
    }
}

/// Runs `step` for every item with a waiter that counts down; `done` runs
/// after the last one reports back (or right away if there are none).
fn fan_out(
    tree: &mut Tree,
    items: Vec<EntryId>,
    done: Option<Waiter>,
    step: impl Fn(&mut Tree, EntryId, Waiter),
) {
    if items.is_empty() {
        if let Some(done) = done {
            done(tree);
        }
        return;
    }

    let pending = Rc::new(Cell::new(items.len()));
    let done = Rc::new(RefCell::new(done));

    for item in items {
        let pending = pending.clone();
        let done = done.clone();
        step(
            tree,
            item,
            Box::new(move |tree: &mut Tree| {
                pending.set(pending.get() - 1);
                if pending.get() == 0 {
                    let done = done.borrow_mut().take();
                    if let Some(done) = done {
                        done(tree);
                    }
                }
            }),
        );
    }
}
