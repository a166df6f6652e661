//! Per-file index state: committed fingerprints and chunk-id sets.
//!
//! The arena is owned by the coordinator and only ever touched under its lock,
//! never across an await point. Scans of one file are exclusive: a change that
//! arrives while a scan is running is parked as a pending action and replayed
//! when the scan releases the file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::chunker::ChunkId;

/// blake3 digest of a file's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(blake3::hash(content))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex).ok().map(Self)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Scanning,
    Indexed,
    Stale,
}

/// Work for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Scan,
    Remove,
}

/// Result of asking for exclusive access to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The caller now owns the file until it calls [`IndexState::release`].
    Run,
    /// A scan is in flight; the action was parked and will be replayed.
    Deferred,
    /// The event fingerprint matches the committed one.
    Unchanged,
    /// Removal of a file that was never tracked.
    Untracked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Fingerprint of the last committed content. `None` until a scan commits,
    /// and again after a failed one.
    pub fingerprint: Option<Fingerprint>,
    /// Ids known to be in the vector store for the committed content.
    pub chunk_ids: BTreeSet<ChunkId>,
    /// Ids written by a scan that has not committed yet.
    pub tentative: BTreeSet<ChunkId>,
    pub status: FileStatus,
    pub pending: Option<Action>,
}

impl FileEntry {
    fn scanning() -> Self {
        Self {
            fingerprint: None,
            chunk_ids: BTreeSet::new(),
            tentative: BTreeSet::new(),
            status: FileStatus::Scanning,
            pending: None,
        }
    }

    /// Committed entry, used when restoring persisted state.
    #[must_use]
    pub fn committed(fingerprint: Option<Fingerprint>, chunk_ids: BTreeSet<ChunkId>) -> Self {
        Self {
            status: if fingerprint.is_some() {
                FileStatus::Indexed
            } else {
                FileStatus::Stale
            },
            fingerprint,
            chunk_ids,
            tentative: BTreeSet::new(),
            pending: None,
        }
    }
}

/// Set difference between the stored ids of a file and a fresh chunking pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkDiff {
    /// Stored ids absent from the new pass.
    pub to_delete: Vec<ChunkId>,
    /// New ids not confirmed in the store.
    pub to_upsert: Vec<ChunkId>,
    pub unchanged: usize,
}

impl ChunkDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_upsert.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct IndexState {
    files: BTreeMap<String, FileEntry>,
}

impl IndexState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, FileEntry)>) -> Self {
        Self {
            files: entries.into_iter().collect(),
        }
    }

    /// Rebuild from vector store payloads keyed by chunk id.
    ///
    /// A file whose chunks disagree on the fingerprint is restored as stale.
    #[must_use]
    pub fn from_payloads(payloads: &HashMap<String, HashMap<String, String>>) -> Self {
        let mut files: BTreeMap<String, (BTreeSet<ChunkId>, Option<Option<String>>)> =
            BTreeMap::new();
        for (chunk_id, fields) in payloads {
            let Some(path) = fields.get("file_path") else {
                continue;
            };
            let fingerprint = fields.get("file_fingerprint").cloned();
            let (ids, seen) = files.entry(path.clone()).or_default();
            ids.insert(ChunkId::from(chunk_id.clone()));
            *seen = match seen.take() {
                None => Some(fingerprint),
                Some(prev) if prev == fingerprint => Some(prev),
                Some(_) => Some(None),
            };
        }

        Self {
            files: files
                .into_iter()
                .map(|(path, (ids, fp))| {
                    let fp = fp.flatten().as_deref().and_then(Fingerprint::from_hex);
                    (path, FileEntry::committed(fp, ids))
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    #[must_use]
    pub fn stale_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, e)| e.status == FileStatus::Stale)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Claim a file for `action`.
    pub fn acquire(
        &mut self,
        path: &str,
        action: Action,
        fingerprint: Option<Fingerprint>,
    ) -> Acquire {
        let Some(entry) = self.files.get_mut(path) else {
            return match action {
                Action::Remove => Acquire::Untracked,
                Action::Scan => {
                    self.files.insert(path.to_owned(), FileEntry::scanning());
                    Acquire::Run
                }
            };
        };

        if entry.status == FileStatus::Scanning {
            entry.pending = Some(action);
            return Acquire::Deferred;
        }

        if action == Action::Scan
            && entry.status == FileStatus::Indexed
            && fingerprint.is_some()
            && entry.fingerprint == fingerprint
        {
            return Acquire::Unchanged;
        }

        entry.status = FileStatus::Scanning;
        Acquire::Run
    }

    /// Diff the stored ids of `path` against a fresh pass.
    ///
    /// Tentative ids from an earlier failed scan are deleted when absent from
    /// the new pass and re-upserted otherwise.
    #[must_use]
    pub fn diff(&self, path: &str, fresh: &BTreeSet<ChunkId>) -> ChunkDiff {
        let Some(entry) = self.files.get(path) else {
            return ChunkDiff {
                to_upsert: fresh.iter().cloned().collect(),
                ..ChunkDiff::default()
            };
        };
        let to_delete = entry
            .chunk_ids
            .union(&entry.tentative)
            .filter(|id| !fresh.contains(*id))
            .cloned()
            .collect();
        let to_upsert: Vec<ChunkId> = fresh.difference(&entry.chunk_ids).cloned().collect();
        ChunkDiff {
            to_delete,
            unchanged: fresh.len() - to_upsert.len(),
            to_upsert,
        }
    }

    pub fn record_deleted(&mut self, path: &str, ids: &[ChunkId]) {
        if let Some(entry) = self.files.get_mut(path) {
            for id in ids {
                entry.chunk_ids.remove(id);
                entry.tentative.remove(id);
            }
        }
    }

    /// Note ids about to be written, before the write is issued.
    pub fn record_tentative(&mut self, path: &str, ids: &[ChunkId]) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.tentative.extend(ids.iter().cloned());
        }
    }

    pub fn commit(&mut self, path: &str, fingerprint: Fingerprint, chunk_ids: BTreeSet<ChunkId>) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.fingerprint = Some(fingerprint);
            entry.chunk_ids = chunk_ids;
            entry.tentative.clear();
            entry.status = FileStatus::Indexed;
        }
    }

    /// The scan did not complete; the next cycle must recheck the file.
    pub fn mark_stale(&mut self, path: &str) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.fingerprint = None;
            entry.status = FileStatus::Stale;
        }
    }

    /// The owning task failed or was cancelled. Parked changes are dropped;
    /// the stale sweep picks the file up again.
    pub fn abandon(&mut self, path: &str) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.fingerprint = None;
            entry.status = FileStatus::Stale;
            entry.pending = None;
        }
    }

    /// All vectors of `path` are gone. Drops the entry unless a scan was
    /// requested meanwhile, in which case the file restarts from empty.
    pub fn finish_removal(&mut self, path: &str) {
        match self.files.get(path).and_then(|e| e.pending) {
            Some(Action::Scan) => {
                let mut fresh = FileEntry::scanning();
                fresh.pending = Some(Action::Scan);
                self.files.insert(path.to_owned(), fresh);
            }
            _ => {
                self.files.remove(path);
            }
        }
    }

    /// Give up exclusive access. Returns the parked action, if any, in which
    /// case the caller keeps ownership and must run it.
    pub fn release(&mut self, path: &str) -> Option<Action> {
        let entry = self.files.get_mut(path)?;
        let next = entry.pending.take()?;
        entry.status = FileStatus::Scanning;
        Some(next)
    }
}
