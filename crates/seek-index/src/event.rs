//! File change events and the file-reading collaborator.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::state::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One change notification. Paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
    /// Fingerprint of the new content when the producer already knows it.
    pub fingerprint: Option<Fingerprint>,
}

impl ChangeEvent {
    #[must_use]
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
            fingerprint: None,
        }
    }

    #[must_use]
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Deleted,
            fingerprint: None,
        }
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

/// Synchronous read access to file contents.
pub trait FileSource: Send + Sync {
    /// # Errors
    ///
    /// `NotFound` when the file no longer exists; other IO errors otherwise.
    fn read(&self, path: &str) -> io::Result<String>;

    /// Size of the file in bytes, checked before reading it.
    ///
    /// # Errors
    ///
    /// Same as [`FileSource::read`].
    fn size(&self, path: &str) -> io::Result<u64>;
}

/// Reads files below a root directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSource for FsSource {
    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(path))
    }

    fn size(&self, path: &str) -> io::Result<u64> {
        std::fs::metadata(self.root.join(path)).map(|meta| meta.len())
    }
}

/// In-memory file tree for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, String>>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` and return the event a watcher would emit.
    pub fn write(&self, path: &str, content: &str) -> ChangeEvent {
        let kind = match self.files.write() {
            Ok(mut files) => match files.insert(path.to_owned(), content.to_owned()) {
                Some(_) => ChangeKind::Modified,
                None => ChangeKind::Created,
            },
            Err(_) => ChangeKind::Modified,
        };
        ChangeEvent {
            path: path.to_owned(),
            kind,
            fingerprint: Some(Fingerprint::of(content.as_bytes())),
        }
    }

    pub fn remove(&self, path: &str) -> ChangeEvent {
        if let Ok(mut files) = self.files.write() {
            files.remove(path);
        }
        ChangeEvent::deleted(path)
    }
}

impl FileSource for MemorySource {
    fn read(&self, path: &str) -> io::Result<String> {
        let files = self
            .files
            .read()
            .map_err(|e| io::Error::other(e.to_string()))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
    }

    fn size(&self, path: &str) -> io::Result<u64> {
        self.read(path).map(|content| content.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_tracks_kinds() {
        let source = MemorySource::new();
        assert_eq!(source.write("a.rs", "v1").kind, ChangeKind::Created);
        let event = source.write("a.rs", "v2");
        assert_eq!(event.kind, ChangeKind::Modified);
        assert_eq!(event.fingerprint, Some(Fingerprint::of(b"v2")));
        assert_eq!(source.read("a.rs").unwrap(), "v2");
        assert_eq!(source.remove("a.rs").kind, ChangeKind::Deleted);
        assert_eq!(
            source.read("a.rs").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn fs_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn x() {}").unwrap();
        let source = FsSource::new(dir.path());
        assert_eq!(source.read("src/lib.rs").unwrap(), "fn x() {}");
        assert_eq!(
            source.read("missing.rs").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
