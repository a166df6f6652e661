use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ignore::gitignore::Gitignore;
use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer};
use tokio::sync::mpsc;

use crate::coordinator::relative_path;
use crate::error::Result;
use crate::event::ChangeEvent;
use crate::languages::is_indexable;
use crate::state::Fingerprint;

/// Turns filesystem notifications below a root into [`ChangeEvent`]s.
///
/// Events are debounced for one second and carry the new content fingerprint,
/// so saves that do not change the file are dropped by the coordinator.
/// Files above `max_file_bytes` are reported as deleted without being read.
/// Dropping the watcher stops it.
pub struct IndexWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl std::fmt::Debug for IndexWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWatcher").finish_non_exhaustive()
    }
}

impl IndexWatcher {
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start(
        root: &Path,
        max_file_bytes: u64,
        sender: mpsc::Sender<ChangeEvent>,
    ) -> Result<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let (ignored, err) = Gitignore::new(root.join(".gitignore"));
        if let Some(e) = err
            && root.join(".gitignore").exists()
        {
            tracing::warn!(error = %e, "failed to parse .gitignore");
        }

        let watch_root = root.clone();
        let mut debouncer = new_debouncer(
            Duration::from_secs(1),
            move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let paths: HashSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any && is_indexable(&e.path))
                    .map(|e| e.path)
                    .collect();

                for path in paths {
                    let Some(event) = change_for(&watch_root, &ignored, max_file_bytes, &path)
                    else {
                        continue;
                    };
                    if sender.blocking_send(event).is_err() {
                        tracing::debug!("index channel closed, dropping change");
                        return;
                    }
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for changes");

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

fn change_for(
    root: &Path,
    ignored: &Gitignore,
    max_bytes: u64,
    path: &Path,
) -> Option<ChangeEvent> {
    if !path.starts_with(root) {
        return None;
    }
    let relative = relative_path(root, path);
    if relative.is_empty() || relative.split('/').any(|part| part.starts_with('.')) {
        return None;
    }
    if path.is_dir() {
        return None;
    }
    if ignored
        .matched_path_or_any_parents(path, false)
        .is_ignore()
    {
        return Some(ChangeEvent::deleted(relative));
    }
    if let Ok(meta) = std::fs::metadata(path)
        && meta.len() > max_bytes
    {
        tracing::debug!(file = %relative, bytes = meta.len(), "file too large, dropping from index");
        return Some(ChangeEvent::deleted(relative));
    }
    match std::fs::read(path) {
        Ok(bytes) => Some(ChangeEvent::modified(relative).with_fingerprint(Fingerprint::of(&bytes))),
        Err(_) => Some(ChangeEvent::deleted(relative)),
    }
}
