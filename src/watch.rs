//! Transcript file watcher (notify; inotify on Linux).
//!
//! Another process (a second viewer, or `chatview ask`) may append to the
//! transcript. The notify callback runs on an internal thread and forwards
//! a unit signal over mpsc; the event loop polls `has_changed`.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{Context, Result};
use log::{debug, trace};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

pub struct TranscriptWatcher {
    rx: mpsc::Receiver<()>,
    path: PathBuf,
    _watcher: RecommendedWatcher, // Drop stops watching
}

impl TranscriptWatcher {
    /// Watch `path`, which must exist.
    ///
    /// Saves replace the file by rename, which drops an inotify watch on the
    /// file itself, so the parent directory is watched and events are
    /// filtered by path.
    pub fn new(path: &Path) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("cannot watch {}", path.display()))?;
        let target = canonical.clone();
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                if !event.paths.iter().any(|p| p == &target) {
                    return;
                }
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    trace!("watch: {:?}", event.kind);
                    let _ = tx.send(());
                }
            },
            notify::Config::default(),
        )?;
        let parent = canonical
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cannot watch root path"))?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
        debug!("watch: watching {}", canonical.display());

        Ok(Self {
            rx,
            path: canonical,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the file changed since the last call. Queued notifications
    /// collapse into one.
    pub fn has_changed(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TranscriptWatcher::new(&dir.path().join("absent.json"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("cannot watch"));
    }

    #[test]
    fn fresh_watcher_reports_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatMessages.json");
        std::fs::write(&path, "[]").unwrap();
        let watcher = TranscriptWatcher::new(&path).unwrap();
        assert_eq!(watcher.path(), path.canonicalize().unwrap());
        assert!(!watcher.has_changed());
    }
}
