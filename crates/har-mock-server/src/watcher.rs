//! Capture directory hot reload.
//!
//! `ReloadSupervisor` keeps the [`TraceStore`] in line with the `*.har`
//! files of one directory. Filesystem notifications are classified on the
//! notify thread and pushed onto a single-consumer channel; one worker task
//! applies them in order, so reloads never interleave. Applying a change
//! always re-reads the file's current state, which makes repeated or
//! out-of-order bursts for the same file safe.

use crate::har::load_har_file;
use crate::metrics;
use crate::store::TraceStore;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// File extension of capture files, matched case-insensitively.
pub const CAPTURE_EXTENSION: &str = "har";

/// A store update derived from a filesystem notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// (Re)load the file at this path.
    Load(PathBuf),
    /// Drop the file at this path from the store.
    Unload(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Load(path) | FileChange::Unload(path) => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to read capture directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to watch capture directory: {0}")]
    Notify(#[from] notify::Error),
    #[error("initial capture scan did not complete: {0}")]
    Scan(#[from] tokio::task::JoinError),
}

pub fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CAPTURE_EXTENSION))
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Map one notification to the store updates it implies.
pub fn classify(event: &Event) -> Vec<FileChange> {
    let captures = event.paths.iter().filter(|path| is_capture_file(path));

    match &event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            captures.cloned().map(FileChange::Load).collect()
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            captures.cloned().map(FileChange::Unload).collect()
        }
        // paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::new();
            if let Some(from) = event.paths.first().filter(|p| is_capture_file(p)) {
                changes.push(FileChange::Unload(from.clone()));
            }
            if let Some(to) = event.paths.get(1).filter(|p| is_capture_file(p)) {
                changes.push(FileChange::Load(to.clone()));
            }
            changes
        }
        // Direction unknown: decide from what is on disk now
        EventKind::Modify(ModifyKind::Name(_)) => captures
            .map(|path| {
                if path.exists() {
                    FileChange::Load(path.clone())
                } else {
                    FileChange::Unload(path.clone())
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Collapse a burst of changes so each path is applied once, at the position
/// of its last occurrence.
pub fn coalesce(batch: Vec<FileChange>) -> Vec<FileChange> {
    let mut seen = HashSet::new();
    let mut latest: Vec<FileChange> = batch
        .into_iter()
        .rev()
        .filter(|change| seen.insert(change.path().to_path_buf()))
        .collect();
    latest.reverse();
    latest
}

/// Apply one change to the store. Failures keep the previous value for the file.
pub fn apply_change(store: &TraceStore, change: &FileChange) {
    let Some(name) = file_name(change.path()) else {
        return;
    };

    match change {
        FileChange::Unload(_) => {
            if store.remove(name) {
                info!("HAR file {} unloaded", name);
                metrics::record_reload("unloaded", store.len());
            }
        }
        FileChange::Load(path) => match load_har_file(path) {
            Ok(file) => {
                let entries = file.log.entries.len();
                if store.upsert(name, file) {
                    info!("HAR file {} reloaded ({} entries)", name, entries);
                } else {
                    info!("HAR file {} loaded ({} entries)", name, entries);
                }
                metrics::record_reload("loaded", store.len());
            }
            Err(e) if e.is_transient() => {
                // Copies raise several events per write; a later one retries
                debug!("HAR file {} not readable yet: {}", name, e);
            }
            Err(e) => {
                warn!("HAR file {} could not be loaded, keeping previous state: {}", name, e);
                metrics::record_reload("failed", store.len());
            }
        },
    }
}

/// Replace the store contents with every capture file in `dir`.
///
/// Files that fail to load are skipped with a warning. Returns the number
/// of files loaded.
pub fn load_directory(dir: &Path, store: &TraceStore) -> Result<usize, WatchError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| WatchError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_capture_file(path))
        .collect();
    paths.sort();

    store.clear();
    let mut loaded = 0;
    for path in &paths {
        let Some(name) = file_name(path) else {
            continue;
        };
        match load_har_file(path) {
            Ok(file) => {
                info!("HAR file {} loaded ({} entries)", name, file.log.entries.len());
                store.upsert(name, file);
                loaded += 1;
            }
            Err(e) => warn!("Skipping HAR file {}: {}", name, e),
        }
    }
    metrics::record_reload("loaded", store.len());
    Ok(loaded)
}

/// Fail unless `dir` exists and is a directory.
fn check_directory(dir: &Path) -> Result<(), WatchError> {
    let metadata = std::fs::metadata(dir).map_err(|source| WatchError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(WatchError::Directory {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    Ok(())
}

/// Watches a capture directory and keeps a [`TraceStore`] in sync with it.
pub struct ReloadSupervisor {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl ReloadSupervisor {
    /// Load every capture file in `dir` into `store`, then start watching for changes.
    pub async fn start(dir: impl Into<PathBuf>, store: Arc<TraceStore>) -> Result<Self, WatchError> {
        let dir = dir.into();
        {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || check_directory(&dir)).await??;
        }

        // Subscribe before scanning so nothing written during the scan is missed
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in classify(&event) {
                    // Receiver only goes away on shutdown
                    let _ = tx.send(change);
                }
            }
            Err(e) => warn!("Capture directory watch error: {}", e),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let loaded = {
            let dir = dir.clone();
            let store = Arc::clone(&store);
            tokio::task::spawn_blocking(move || load_directory(&dir, &store)).await??
        };
        info!("Loaded {} HAR files from {}", loaded, dir.display());

        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(rx, store, shutdown.clone()));
        info!("Watching {} for *.{} changes", dir.display(), CAPTURE_EXTENSION);

        Ok(Self {
            dir,
            watcher: Some(watcher),
            worker: Some(worker),
            shutdown,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stop watching and wait for the worker to finish its current change.
    /// The store keeps whatever it holds at this point.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        drop(self.watcher.take());
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Reload worker failed: {}", e);
            }
        }
        info!("Stopped watching {}", self.dir.display());
    }
}

impl Drop for ReloadSupervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<FileChange>,
    store: Arc<TraceStore>,
    shutdown: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            change = rx.recv() => match change {
                Some(change) => change,
                None => break,
            },
        };

        let mut batch = vec![first];
        while let Ok(change) = rx.try_recv() {
            batch.push(change);
        }

        let store = Arc::clone(&store);
        let applied = tokio::task::spawn_blocking(move || {
            for change in coalesce(batch) {
                apply_change(&store, &change);
            }
        })
        .await;
        if let Err(e) = applied {
            error!("Reload task failed: {}", e);
        }
    }
    debug!("Reload worker stopped");
}
