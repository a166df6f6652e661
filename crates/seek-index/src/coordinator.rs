//! Incremental index maintenance: change events in, vector store writes out.
//!
//! Each file moves through `Untracked -> Scanning -> Indexed/Stale -> Removed`.
//! A file is scanned by at most one task at a time; changes that arrive
//! mid-scan are parked in [`IndexState`] and replayed by the task that owns
//! the file, so the last committed content is always the latest one read.

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Component, Path};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use seek_embed::{EmbeddingProvider, TextKind};
use seek_store::{Distance, VectorFilter, VectorPoint, VectorStore};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::chunker::{Chunk, ChunkId, chunk_file};
use crate::config::IndexerConfig;
use crate::context::contextualize_for_embedding;
use crate::error::{IndexError, Result};
use crate::event::{ChangeEvent, ChangeKind, FileSource};
use crate::languages::{detect_language, is_indexable};
use crate::retry::{RetryPolicy, retry};
use crate::search::{ChunkPayload, SearchQuery, SearchResult};
use crate::state::{Acquire, Action, FileStatus, Fingerprint, IndexState};
use crate::state_store::StateStore;

/// Chunks embedded and upserted per round trip.
const UPSERT_BATCH: usize = 64;

/// What happened to a file after one [`IndexCoordinator::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { upserted: usize, deleted: usize },
    Unchanged,
    Removed,
    /// Another task owns the file and will pick the change up.
    Deferred,
    /// Removal of a file that was never indexed.
    Untracked,
    /// A transient failure outlasted the retries; the stale sweep retries it.
    Stale,
}

/// Summary of a directory indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub files_stale: usize,
    /// Files over `max_file_bytes`.
    pub files_skipped: usize,
    pub chunks_upserted: usize,
    pub chunks_deleted: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl IndexReport {
    fn record(&mut self, path: &str, result: Result<FileOutcome>) {
        match result {
            Ok(FileOutcome::Indexed { upserted, deleted }) => {
                self.files_indexed += 1;
                self.chunks_upserted += upserted;
                self.chunks_deleted += deleted;
            }
            Ok(FileOutcome::Unchanged) => self.files_unchanged += 1,
            Ok(FileOutcome::Removed) => self.files_removed += 1,
            Ok(FileOutcome::Stale) => self.files_stale += 1,
            Ok(FileOutcome::Deferred | FileOutcome::Untracked) => {}
            Err(e) => self.errors.push(format!("{path}: {e}")),
        }
    }
}

/// Owns the index state of one project and drives chunk, embed, and upsert.
pub struct IndexCoordinator<P> {
    provider: P,
    store: Arc<dyn VectorStore>,
    source: Arc<dyn FileSource>,
    collection: String,
    config: IndexerConfig,
    retry: RetryPolicy,
    state: Mutex<IndexState>,
    persist: Option<StateStore>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<P> std::fmt::Debug for IndexCoordinator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCoordinator")
            .field("collection", &self.collection)
            .field("workers", &self.config.workers)
            .field("persisted", &self.persist.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: EmbeddingProvider + 'static> IndexCoordinator<P> {
    #[must_use]
    pub fn new(
        provider: P,
        store: Arc<dyn VectorStore>,
        source: Arc<dyn FileSource>,
        collection: impl Into<String>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            source,
            collection: collection.into(),
            retry: config.retry_policy(),
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            config,
            state: Mutex::new(IndexState::new()),
            persist: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Persist the index state in `SQLite` instead of rebuilding it from the
    /// vector store on every start.
    #[must_use]
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.persist = Some(store);
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn file_status(&self, path: &str) -> Option<FileStatus> {
        self.lock_state().get(path).map(|e| e.status)
    }

    #[must_use]
    pub fn tracked_files(&self) -> usize {
        self.lock_state().len()
    }

    /// Ensure the collection exists and restore the index state.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] or [`IndexError::ModelMismatch`]
    /// when the collection was built by another model, and
    /// [`IndexError::VectorStoreUnavailable`] when the store cannot be reached.
    pub async fn start(&self) -> Result<()> {
        self.ensure_collection().await?;
        let model_id = self.provider.model_id();

        let state = match &self.persist {
            Some(persist) => {
                if let Some(found) = persist.model().await?
                    && found != model_id
                {
                    return Err(self.model_mismatch(found));
                }
                let mut state = persist.load().await?;
                if state.is_empty() {
                    state = self.rebuild_from_store().await?;
                    for path in state.paths() {
                        if let Some(entry) = state.get(path) {
                            persist.save_file(path, entry).await?;
                        }
                    }
                }
                persist.set_model(model_id).await?;
                state
            }
            None => self.rebuild_from_store().await?,
        };

        let stale = state.stale_paths().len();
        tracing::info!(
            collection = %self.collection,
            files = state.len(),
            stale,
            model = model_id,
            "index state restored"
        );
        *self.lock_state() = state;
        Ok(())
    }

    /// Drop every vector and all state, then recreate the empty collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the state database fails.
    pub async fn reset(&self) -> Result<()> {
        retry(&self.retry, "delete_collection", || {
            self.store.delete_collection(&self.collection)
        })
        .await?;
        self.ensure_collection().await?;
        self.lock_state().clear();
        if let Some(persist) = &self.persist {
            persist.clear().await?;
            persist.set_model(self.provider.model_id()).await?;
        }
        tracing::info!(collection = %self.collection, "index reset");
        Ok(())
    }

    /// Cancel in-flight scans. Files being scanned stay stale.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Apply one change event.
    ///
    /// Transient embedding or vector store failures do not surface here: the
    /// file is left [`FileStatus::Stale`] and [`FileOutcome::Stale`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Cancelled`] after [`close`](Self::close), and
    /// structural errors such as [`IndexError::DimensionMismatch`].
    pub async fn process(&self, event: ChangeEvent) -> Result<FileOutcome> {
        if self.cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let path = event.path;
        let mut action = match event.kind {
            ChangeKind::Deleted => Action::Remove,
            ChangeKind::Created | ChangeKind::Modified => Action::Scan,
        };

        let acquired = self.lock_state().acquire(&path, action, event.fingerprint);
        match acquired {
            Acquire::Run => {}
            Acquire::Deferred => {
                tracing::debug!(file = %path, "scan in flight, change deferred");
                return Ok(FileOutcome::Deferred);
            }
            Acquire::Unchanged => return Ok(FileOutcome::Unchanged),
            Acquire::Untracked => return Ok(FileOutcome::Untracked),
        }

        loop {
            let run = async {
                match action {
                    Action::Scan => self.scan(&path).await,
                    Action::Remove => self.remove(&path).await,
                }
            };
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(IndexError::Cancelled),
                result = run => result,
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.lock_state().abandon(&path);
                    self.persist_entry(&path).await;
                    return Err(e);
                }
            };

            let next = self.lock_state().release(&path);
            match next {
                Some(next) => {
                    tracing::debug!(file = %path, ?next, "replaying change that arrived mid-scan");
                    action = next;
                }
                None => return Ok(outcome),
            }
        }
    }

    /// Remove every vector of `path` and forget it.
    ///
    /// # Errors
    ///
    /// See [`process`](Self::process).
    pub async fn remove_file(&self, path: &str) -> Result<FileOutcome> {
        self.process(ChangeEvent::deleted(path)).await
    }

    /// Embed `query` and return the nearest chunks, best first.
    ///
    /// Does not wait for in-flight scans.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::VectorStoreUnavailable`] or
    /// [`IndexError::Embedding`] when retries are exhausted; never an empty
    /// result in place of a failure.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>> {
        let k = query.k.unwrap_or(self.config.default_k);
        if k == 0 || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let text = std::slice::from_ref(&query.text);
        let embedded = retry(&self.retry, "embed_query", || {
            self.provider.embed(text, TextKind::Query)
        })
        .await?;
        let Some(embedding) = embedded.into_iter().next() else {
            return Err(IndexError::Embedding("provider returned no query vector".into()));
        };
        if embedding.truncated {
            tracing::warn!(chars = query.text.len(), "query truncated to model context");
        }

        let filter = query.filter.to_vector_filter();
        let limit = u64::try_from(k).unwrap_or(u64::MAX);
        let points = retry(&self.retry, "search", || {
            self.store.search(
                &self.collection,
                embedding.vector.clone(),
                limit,
                filter.clone(),
            )
        })
        .await?;

        let min_score = query.min_score.unwrap_or(self.config.score_threshold);
        let mut results = Vec::with_capacity(points.len());
        for point in points.into_iter().filter(|p| p.score >= min_score) {
            let id = point.id.clone();
            match SearchResult::from_scored(point) {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(point = %id, error = %e, "skipping malformed payload"),
            }
        }
        results.truncate(k);
        Ok(results)
    }

    /// Walk `root` and bring every indexable file up to date, removing
    /// tracked files that no longer exist. `root` must be the directory the
    /// coordinator's [`FileSource`] reads from.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Cancelled`] if the run was cancelled, or the first
    /// fatal error; per-file failures are listed in the report.
    pub async fn index_directory(self: &Arc<Self>, root: &Path) -> Result<IndexReport> {
        let started = Instant::now();
        let walk_root = root.to_path_buf();
        let max_bytes = self.config.max_file_bytes;
        let (files, skipped) =
            tokio::task::spawn_blocking(move || collect_files(&walk_root, max_bytes))
                .await
                .map_err(|e| IndexError::Io(io::Error::other(e)))?;

        tracing::info!(root = %root.display(), files = files.len(), skipped, "indexing started");

        let present: HashSet<&str> = files.iter().map(String::as_str).collect();
        let missing: Vec<String> = self
            .lock_state()
            .paths()
            .filter(|p| !present.contains(p))
            .map(str::to_owned)
            .collect();

        let mut report = IndexReport {
            files_scanned: files.len(),
            files_skipped: skipped,
            ..IndexReport::default()
        };
        let events = files
            .iter()
            .map(ChangeEvent::modified)
            .chain(missing.into_iter().map(ChangeEvent::deleted))
            .collect();

        let mut fatal = None;
        for (path, result) in self.run_all(events).await {
            match result {
                Err(e) if e.is_fatal() => {
                    report.errors.push(format!("{path}: {e}"));
                    fatal.get_or_insert(e);
                }
                other => report.record(&path, other),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        report.duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            removed = report.files_removed,
            stale = report.files_stale,
            upserted = report.chunks_upserted,
            deleted = report.chunks_deleted,
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        Ok(report)
    }

    /// Rescan every stale file. Returns how many are still stale afterwards.
    pub async fn retry_stale(self: &Arc<Self>) -> usize {
        let stale = self.lock_state().stale_paths();
        if stale.is_empty() {
            return 0;
        }
        tracing::debug!(files = stale.len(), "retrying stale files");
        for (path, result) in self.run_all(stale.into_iter().map(ChangeEvent::modified).collect()).await {
            if let Err(e) = result {
                tracing::warn!(file = %path, error = %e, "stale retry failed");
            }
        }
        self.lock_state().stale_paths().len()
    }

    /// Consume change events until the channel closes or the coordinator is
    /// closed. Files are processed concurrently up to `workers`; stale files
    /// are retried every `stale_sweep_secs`.
    pub fn spawn(self: Arc<Self>, mut events: mpsc::Receiver<ChangeEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            let mut sweep = tokio::time::interval(self.config.stale_sweep_interval());
            sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            sweep.tick().await;

            loop {
                let event = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        log_task_result(joined);
                        continue;
                    }
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = sweep.tick() => {
                        let stale = self.lock_state().stale_paths();
                        for path in stale {
                            if !self.dispatch(&mut tasks, ChangeEvent::modified(path)).await {
                                break;
                            }
                        }
                        continue;
                    }
                };
                if !self.dispatch(&mut tasks, event).await {
                    break;
                }
            }

            while let Some(joined) = tasks.join_next().await {
                log_task_result(joined);
            }
            tracing::debug!(collection = %self.collection, "index worker stopped");
        })
    }

    /// Wait for a worker slot and start `event`. False once cancelled.
    async fn dispatch(
        self: &Arc<Self>,
        tasks: &mut JoinSet<(String, Result<FileOutcome>)>,
        event: ChangeEvent,
    ) -> bool {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return false,
            permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };
        let this = Arc::clone(self);
        tasks.spawn(async move {
            let _permit = permit;
            let path = event.path.clone();
            (path, this.process(event).await)
        });
        true
    }

    async fn run_all(self: &Arc<Self>, events: Vec<ChangeEvent>) -> Vec<(String, Result<FileOutcome>)> {
        let mut tasks = JoinSet::new();
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            if !self.dispatch(&mut tasks, event).await {
                break;
            }
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "index task failed"),
            }
        }
        results
    }

    async fn scan(&self, path: &str) -> Result<FileOutcome> {
        let Some(lang) = detect_language(Path::new(path)) else {
            return self.remove(path).await;
        };

        let source = Arc::clone(&self.source);
        let chunker = self.config.chunker.clone();
        let max_bytes = self.config.max_file_bytes;
        let owned_path = path.to_owned();
        let loaded = tokio::task::spawn_blocking(move || {
            if source.size(&owned_path)? > max_bytes {
                return Ok(None);
            }
            source.read(&owned_path).map(|content| {
                let fingerprint = Fingerprint::of(content.as_bytes());
                Some((fingerprint, chunk_file(&content, &owned_path, lang, &chunker)))
            })
        })
        .await
        .map_err(io::Error::other)
        .and_then(|r| r);

        let (fingerprint, chunks) = match loaded {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                tracing::debug!(file = path, max_bytes, "file too large, removing");
                return self.remove(path).await;
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidData) => {
                tracing::debug!(file = path, error = %e, "file gone or not text, removing");
                return self.remove(path).await;
            }
            Err(e) => return Ok(self.leave_stale(path, &IndexError::Io(e)).await),
        };

        let fresh: BTreeSet<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
        let diff = self.lock_state().diff(path, &fresh);
        if diff.is_empty() {
            self.lock_state().commit(path, fingerprint, fresh);
            self.persist_entry(path).await;
            return Ok(FileOutcome::Unchanged);
        }

        if !diff.to_delete.is_empty() {
            let ids: Vec<String> = diff.to_delete.iter().map(ToString::to_string).collect();
            let deleted = retry(&self.retry, "delete_by_ids", || {
                self.store.delete_by_ids(&self.collection, ids.clone())
            })
            .await;
            if let Some(outcome) = self.settle(path, deleted).await? {
                return Ok(outcome);
            }
            self.lock_state().record_deleted(path, &diff.to_delete);
        }

        let wanted: HashSet<&ChunkId> = diff.to_upsert.iter().collect();
        let pending: Vec<&Chunk> = chunks.iter().filter(|c| wanted.contains(&c.id)).collect();
        self.lock_state().record_tentative(path, &diff.to_upsert);
        self.persist_entry(path).await;

        for group in pending.chunks(UPSERT_BATCH) {
            let points = match self.embed_group(path, group, fingerprint).await {
                Ok(points) => points,
                Err(e) if e.is_transient() => return Ok(self.leave_stale(path, &e).await),
                Err(e) => return Err(e),
            };
            let written = retry(&self.retry, "upsert", || {
                self.store.upsert(&self.collection, points.clone())
            })
            .await;
            if let Some(outcome) = self.settle(path, written).await? {
                return Ok(outcome);
            }
        }

        self.lock_state().commit(path, fingerprint, fresh);
        self.persist_entry(path).await;
        tracing::debug!(
            file = path,
            upserted = diff.to_upsert.len(),
            deleted = diff.to_delete.len(),
            unchanged = diff.unchanged,
            "file indexed"
        );
        Ok(FileOutcome::Indexed {
            upserted: diff.to_upsert.len(),
            deleted: diff.to_delete.len(),
        })
    }

    async fn embed_group(
        &self,
        path: &str,
        group: &[&Chunk],
        fingerprint: Fingerprint,
    ) -> Result<Vec<VectorPoint>> {
        let texts: Vec<String> = group.iter().map(|c| contextualize_for_embedding(c)).collect();
        let embeddings = retry(&self.retry, "embed", || {
            self.provider.embed(&texts, TextKind::Document)
        })
        .await?;
        if embeddings.len() != group.len() {
            return Err(IndexError::Embedding(format!(
                "expected {} vectors, got {}",
                group.len(),
                embeddings.len()
            )));
        }

        let model_id = self.provider.model_id();
        group
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                if embedding.truncated {
                    tracing::warn!(
                        file = path,
                        lines = ?chunk.line_range,
                        "chunk truncated to model context"
                    );
                }
                Ok(VectorPoint {
                    id: chunk.id.to_string(),
                    vector: embedding.vector,
                    payload: ChunkPayload::new(chunk, fingerprint, model_id).into_fields()?,
                })
            })
            .collect()
    }

    async fn remove(&self, path: &str) -> Result<FileOutcome> {
        let filter = VectorFilter::default().must_match("file_path", path);
        let deleted = retry(&self.retry, "delete_by_filter", || {
            self.store.delete_by_filter(&self.collection, filter.clone())
        })
        .await;
        if let Some(outcome) = self.settle(path, deleted).await? {
            return Ok(outcome);
        }
        self.lock_state().finish_removal(path);
        self.persist_entry(path).await;
        tracing::debug!(file = path, "file removed from index");
        Ok(FileOutcome::Removed)
    }

    /// `Ok(None)` to continue, `Ok(Some(Stale))` after a transient failure.
    async fn settle<T>(&self, path: &str, result: Result<T>) -> Result<Option<FileOutcome>> {
        match result {
            Ok(_) => Ok(None),
            Err(e) if e.is_transient() => Ok(Some(self.leave_stale(path, &e).await)),
            Err(e) => Err(e),
        }
    }

    async fn leave_stale(&self, path: &str, error: &IndexError) -> FileOutcome {
        tracing::warn!(file = path, error = %error, "file left stale");
        self.lock_state().mark_stale(path);
        self.persist_entry(path).await;
        FileOutcome::Stale
    }

    async fn persist_entry(&self, path: &str) {
        let Some(persist) = &self.persist else {
            return;
        };
        let entry = self.lock_state().get(path).cloned();
        let result = match entry {
            Some(entry) => persist.save_file(path, &entry).await,
            None => persist.remove_file(path).await,
        };
        if let Err(e) = result {
            tracing::warn!(file = path, error = %e, "failed to persist index state");
        }
    }

    async fn ensure_collection(&self) -> Result<()> {
        let dimension = u64::try_from(self.provider.dimension()).unwrap_or(u64::MAX);
        retry(&self.retry, "ensure_collection", || {
            self.store
                .ensure_collection(&self.collection, dimension, Distance::Cosine)
        })
        .await
    }

    async fn rebuild_from_store(&self) -> Result<IndexState> {
        let payloads = retry(&self.retry, "scroll", || {
            self.store.scroll_all(&self.collection, "chunk_id")
        })
        .await?;
        let model_id = self.provider.model_id();
        if let Some(found) = payloads
            .values()
            .filter_map(|fields| fields.get("embedding_model"))
            .find(|m| m.as_str() != model_id)
        {
            return Err(self.model_mismatch(found.clone()));
        }
        Ok(IndexState::from_payloads(&payloads))
    }

    fn model_mismatch(&self, found: String) -> IndexError {
        IndexError::ModelMismatch {
            collection: self.collection.clone(),
            expected: self.provider.model_id().to_owned(),
            found,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_task_result(joined: std::result::Result<(String, Result<FileOutcome>), tokio::task::JoinError>) {
    match joined {
        Ok((_, Ok(_))) => {}
        Ok((path, Err(IndexError::Cancelled))) => {
            tracing::debug!(file = %path, "scan cancelled");
        }
        Ok((path, Err(e))) => tracing::warn!(file = %path, error = %e, "indexing failed"),
        Err(e) => tracing::error!(error = %e, "index task failed"),
    }
}

/// Indexable files below `root` honouring ignore files, as `/`-separated
/// relative paths, plus the number skipped for size.
fn collect_files(root: &Path, max_bytes: u64) -> (Vec<String>, usize) {
    let mut files = Vec::new();
    let mut skipped = 0;
    for entry in ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
        .flatten()
    {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) || !is_indexable(entry.path()) {
            continue;
        }
        if entry.metadata().is_ok_and(|m| m.len() > max_bytes) {
            skipped += 1;
            continue;
        }
        files.push(relative_path(root, entry.path()));
    }
    files.sort();
    (files, skipped)
}

/// `path` relative to `root` with `/` separators.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("/project");
        assert_eq!(
            relative_path(root, Path::new("/project/src/lib.rs")),
            "src/lib.rs"
        );
        assert_eq!(relative_path(root, Path::new("/project/a.py")), "a.py");
    }

    #[test]
    fn collect_files_skips_large_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("big.rs"), "x".repeat(64)).unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join(".hidden.rs"), "fn h() {}").unwrap();

        let (files, skipped) = collect_files(dir.path(), 32);
        assert_eq!(files, vec!["src/lib.rs".to_string()]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn collect_files_honours_ignore_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".ignore"), "generated/\n").unwrap();
        std::fs::create_dir(dir.path().join("generated")).unwrap();
        std::fs::write(dir.path().join("generated/out.rs"), "fn g() {}").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let (files, _) = collect_files(dir.path(), 1024);
        assert_eq!(files, vec!["main.rs".to_string()]);
    }

    #[test]
    fn report_tallies_outcomes() {
        let mut report = IndexReport::default();
        report.record(
            "a.rs",
            Ok(FileOutcome::Indexed {
                upserted: 3,
                deleted: 1,
            }),
        );
        report.record("b.rs", Ok(FileOutcome::Unchanged));
        report.record("c.rs", Ok(FileOutcome::Stale));
        report.record("d.rs", Err(IndexError::Cancelled));
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.chunks_upserted, 3);
        assert_eq!(report.chunks_deleted, 1);
        assert_eq!(report.files_unchanged, 1);
        assert_eq!(report.files_stale, 1);
        assert_eq!(report.errors, vec!["d.rs: operation cancelled".to_string()]);
    }
}
