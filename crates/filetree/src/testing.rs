//! An in-memory [`Lister`] for driving a tree without touching the disk

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ScanError;
use crate::scanner::{Lister, RawEntry};

#[derive(Debug, Default)]
struct State {
    /// Every known path in insertion order, which is also listing order
    nodes: Vec<(PathBuf, bool, u32)>,
    failures: HashMap<PathBuf, String>,
    calls: HashMap<PathBuf, usize>,
}

/// A fake filesystem. Adding a path creates its missing ancestors as
/// directories. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemLister {
    state: Arc<Mutex<State>>,
}

impl MemLister {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>) {
        self.add(path.as_ref(), false, 0o644);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.add(path.as_ref(), true, 0o755);
    }

    fn add(&self, path: &Path, is_dir: bool, mode: u32) {
        let mut state = self.state();

        let mut missing: Vec<PathBuf> = path
            .ancestors()
            .skip(1)
            .filter(|a| a.parent().is_some())
            .take_while(|a| !state.nodes.iter().any(|(p, _, _)| p == a))
            .map(Path::to_path_buf)
            .collect();
        missing.reverse();
        for dir in missing {
            state.nodes.push((dir, true, 0o755));
        }

        if let Some(node) = state.nodes.iter_mut().find(|(p, _, _)| p == path) {
            *node = (path.to_path_buf(), is_dir, mode);
        } else {
            state.nodes.push((path.to_path_buf(), is_dir, mode));
        }
    }

    /// Removes `path` and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.state().nodes.retain(|(p, _, _)| !p.starts_with(path));
    }

    pub fn set_mode(&self, path: impl AsRef<Path>, mode: u32) {
        let path = path.as_ref();
        if let Some(node) = self.state().nodes.iter_mut().find(|(p, _, _)| p == path) {
            node.2 = mode;
        }
    }

    /// Makes listing `path` fail with `message` until [`MemLister::heal`].
    pub fn fail(&self, path: impl AsRef<Path>, message: &str) {
        self.state()
            .failures
            .insert(path.as_ref().to_path_buf(), message.to_string());
    }

    pub fn heal(&self, path: impl AsRef<Path>) {
        self.state().failures.remove(path.as_ref());
    }

    /// How many times `path` has been listed.
    pub fn calls(&self, path: impl AsRef<Path>) -> usize {
        self.state().calls.get(path.as_ref()).copied().unwrap_or(0)
    }
}

impl Lister for MemLister {
    fn list(&self, path: &Path) -> Result<Vec<RawEntry>, ScanError> {
        let mut state = self.state();
        *state.calls.entry(path.to_path_buf()).or_default() += 1;

        if let Some(message) = state.failures.get(path) {
            return Err(ScanError::Io {
                path: path.to_path_buf(),
                message: message.clone(),
            });
        }

        match state.nodes.iter().find(|(p, _, _)| p == path) {
            Some((_, true, _)) => {}
            Some((_, false, _)) => {
                return Err(ScanError::NotADirectory {
                    path: path.to_path_buf(),
                })
            }
            None => {
                return Err(ScanError::NotFound {
                    path: path.to_path_buf(),
                })
            }
        }

        Ok(state
            .nodes
            .iter()
            .filter(|(p, _, _)| p.parent() == Some(path))
            .map(|(p, is_dir, mode)| RawEntry {
                name: p.file_name().map(|n| n.to_os_string()).unwrap_or_default(),
                is_dir: *is_dir,
                mode: *mode,
            })
            .collect())
    }
}
