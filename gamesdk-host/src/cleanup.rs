//! Process-wide registry of staged temporary files and directories.
//!
//! Every staging operation registers what it creates here. The registry is
//! drained once at exit by the [`ExitCleanup`] guard that `main` holds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

static GLOBAL: Lazy<Arc<TempRegistry>> = Lazy::new(|| Arc::new(TempRegistry::new()));

/// Ordered list of paths to delete at cleanup time.
#[derive(Debug, Default)]
pub struct TempRegistry {
    entries: Mutex<Vec<PathBuf>>,
}

/// Outcome of a [`TempRegistry::drain`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: Vec<PathBuf>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>) {
        self.entries.lock().push(path.into());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().iter().any(|p| p == path)
    }

    /// Delete every registered path, newest first, so files go before the
    /// directories that hold them. Paths already gone count as removed.
    pub fn drain(&self) -> CleanupReport {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut report = CleanupReport::default();

        for path in entries.into_iter().rev() {
            let result = if path.is_dir() {
                std::fs::remove_dir(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), "failed to remove staged path: {e}");
                    report.failed.push(path);
                }
            }
        }

        report
    }
}

/// The registry shared by every default-configured stager.
pub fn global() -> Arc<TempRegistry> {
    Arc::clone(&GLOBAL)
}

/// Drains the global registry when dropped.
#[must_use = "staged files are only removed when the guard is dropped"]
pub struct ExitCleanup {
    registry: Arc<TempRegistry>,
}

impl Drop for ExitCleanup {
    fn drop(&mut self) {
        let report = self.registry.drain();
        debug!(
            removed = report.removed,
            failed = report.failed.len(),
            "temporary artifacts cleaned up"
        );
    }
}

/// Install the exit hook. Hold the returned guard for the life of `main`.
pub fn cleanup_on_exit() -> ExitCleanup {
    ExitCleanup { registry: global() }
}
