//! Running directory scans off the interactive thread

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::entry::EntryId;
use crate::error::ScanError;
use crate::scanner::{self, Listed, Lister};
use crate::tree::Tree;

/// Identifies one scan of one directory. A completion is only applied if
/// its ticket is still the directory's in-flight ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanTicket(pub(crate) u64);

/// A scan the tree wants performed.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub dir: EntryId,
    pub ticket: ScanTicket,
    pub path: PathBuf,
}

impl ScanJob {
    /// Performs the listing. Blocking.
    pub fn run(self, lister: &dyn Lister) -> ScanCompletion {
        let result = scanner::scan(lister, &self.path);
        ScanCompletion {
            dir: self.dir,
            ticket: self.ticket,
            result,
        }
    }
}

/// The outcome of a [`ScanJob`], handed back to [`Tree::complete`] on the
/// interactive thread.
#[derive(Debug)]
pub struct ScanCompletion {
    pub dir: EntryId,
    pub ticket: ScanTicket,
    pub result: Result<Vec<Listed>, ScanError>,
}

/// Accepts scan jobs from the tree. Implementations must not call back into
/// the tree from `schedule`; results are delivered later through
/// [`Tree::complete`].
pub trait ScanScheduler {
    fn schedule(&mut self, job: ScanJob);
}

/// Runs scans on tokio's blocking pool and sends completions over a channel
/// that the interactive loop drains.
pub struct TokioScheduler {
    runtime: Handle,
    lister: Arc<dyn Lister>,
    completions: mpsc::UnboundedSender<ScanCompletion>,
}

impl TokioScheduler {
    pub fn new(
        runtime: Handle,
        lister: Arc<dyn Lister>,
    ) -> (Self, mpsc::UnboundedReceiver<ScanCompletion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        (
            Self {
                runtime,
                lister,
                completions,
            },
            rx,
        )
    }
}

impl ScanScheduler for TokioScheduler {
    fn schedule(&mut self, job: ScanJob) {
        let lister = self.lister.clone();
        let completions = self.completions.clone();

        self.runtime.spawn_blocking(move || {
            let completion = job.run(lister.as_ref());
            if completions.send(completion).is_err() {
                debug!("scan finished after the tree went away");
            }
        });
    }
}

/// Holds jobs until they are pumped explicitly. Clones share one queue, so
/// a tree can own one handle while the caller drives another.
#[derive(Debug, Clone, Default)]
pub struct ScanQueue {
    jobs: Rc<RefCell<VecDeque<ScanJob>>>,
    scheduled: Rc<Cell<usize>>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total jobs ever scheduled on this queue.
    pub fn scheduled(&self) -> usize {
        self.scheduled.get()
    }

    pub(crate) fn pop(&self) -> Option<ScanJob> {
        self.jobs.borrow_mut().pop_front()
    }

    /// Runs the oldest job and applies it. Returns false if nothing was queued.
    pub fn run_next(&self, tree: &mut Tree, lister: &dyn Lister) -> bool {
        let Some(job) = self.pop() else {
            return false;
        };
        tree.complete(job.run(lister));
        true
    }

    /// Runs jobs, including ones scheduled by completions, until none are
    /// left. Returns how many ran.
    pub fn run_until_idle(&self, tree: &mut Tree, lister: &dyn Lister) -> usize {
        let mut ran = 0;
        while self.run_next(tree, lister) {
            ran += 1;
        }
        ran
    }
}

impl ScanScheduler for ScanQueue {
    fn schedule(&mut self, job: ScanJob) {
        self.jobs.borrow_mut().push_back(job);
        self.scheduled.set(self.scheduled.get() + 1);
    }
}
