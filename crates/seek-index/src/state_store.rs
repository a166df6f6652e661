//! `SQLite` persistence for [`IndexState`].

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::chunker::ChunkId;
use crate::error::Result;
use crate::state::{FileEntry, FileStatus, Fingerprint, IndexState};

const MODEL_KEY: &str = "embedding_model";

#[derive(Debug, Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (or create) the state database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // in-memory databases are per connection
        let max_connections = if path == ":memory:" { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Load every persisted file entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load(&self) -> Result<IndexState> {
        let files: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT path, fingerprint FROM indexed_files ORDER BY path")
                .fetch_all(&self.pool)
                .await?;
        let chunks: Vec<(String, String, bool)> =
            sqlx::query_as("SELECT path, chunk_id, committed FROM indexed_chunks")
                .fetch_all(&self.pool)
                .await?;

        let mut entries: BTreeMap<String, FileEntry> = files
            .into_iter()
            .map(|(path, fp)| {
                let fp = fp.as_deref().and_then(Fingerprint::from_hex);
                (path, FileEntry::committed(fp, BTreeSet::new()))
            })
            .collect();
        for (path, chunk_id, committed) in chunks {
            let Some(entry) = entries.get_mut(&path) else {
                continue;
            };
            let id = ChunkId::from(chunk_id);
            if committed {
                entry.chunk_ids.insert(id);
            } else {
                entry.tentative.insert(id);
            }
        }
        for entry in entries.values_mut() {
            if !entry.tentative.is_empty() {
                entry.fingerprint = None;
                entry.status = FileStatus::Stale;
            }
        }

        Ok(IndexState::from_entries(entries))
    }

    /// Replace the persisted entry of one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn save_file(&self, path: &str, entry: &FileEntry) -> Result<()> {
        let fingerprint = match entry.status {
            FileStatus::Indexed => entry.fingerprint.map(|fp| fp.to_hex()),
            FileStatus::Scanning | FileStatus::Stale => None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO indexed_files (path, fingerprint) VALUES (?, ?) \
             ON CONFLICT(path) DO UPDATE SET fingerprint = excluded.fingerprint, \
             updated_at = datetime('now')",
        )
        .bind(path)
        .bind(fingerprint)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM indexed_chunks WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        let rows = entry
            .chunk_ids
            .iter()
            .map(|id| (id, true))
            .chain(entry.tentative.iter().map(|id| (id, false)));
        for (id, committed) in rows {
            sqlx::query(
                "INSERT OR REPLACE INTO indexed_chunks (path, chunk_id, committed) VALUES (?, ?, ?)",
            )
            .bind(path)
            .bind(id.as_str())
            .bind(committed)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM indexed_files WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Forget every file and the recorded model.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM indexed_chunks")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM indexed_files")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn model(&self) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM index_meta WHERE key = ?")
            .bind(MODEL_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn set_model(&self, model_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(MODEL_KEY)
        .bind(model_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Acquire, Action};

    fn ids(names: &[&str]) -> BTreeSet<ChunkId> {
        names.iter().map(|n| ChunkId::from((*n).to_string())).collect()
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let store = StateStore::open(":memory:").await.unwrap();
        let mut state = IndexState::new();
        assert_eq!(state.acquire("a.rs", Action::Scan, None), Acquire::Run);
        state.commit("a.rs", Fingerprint::of(b"v1"), ids(&["x", "y"]));
        store.save_file("a.rs", state.get("a.rs").unwrap()).await.unwrap();

        let loaded = store.load().await.unwrap();
        let entry = loaded.get("a.rs").unwrap();
        assert_eq!(entry.status, FileStatus::Indexed);
        assert_eq!(entry.fingerprint, Some(Fingerprint::of(b"v1")));
        assert_eq!(entry.chunk_ids, ids(&["x", "y"]));
    }

    #[tokio::test]
    async fn tentative_ids_restore_as_stale() {
        let store = StateStore::open(":memory:").await.unwrap();
        let mut state = IndexState::new();
        state.acquire("a.rs", Action::Scan, None);
        state.record_tentative("a.rs", &[ChunkId::from("t".to_string())]);
        state.mark_stale("a.rs");
        store.save_file("a.rs", state.get("a.rs").unwrap()).await.unwrap();

        let loaded = store.load().await.unwrap();
        let entry = loaded.get("a.rs").unwrap();
        assert_eq!(entry.status, FileStatus::Stale);
        assert_eq!(entry.tentative, ids(&["t"]));
        assert_eq!(loaded.stale_paths(), vec!["a.rs".to_string()]);
    }

    #[tokio::test]
    async fn save_replaces_chunk_set() {
        let store = StateStore::open(":memory:").await.unwrap();
        let entry = FileEntry::committed(Some(Fingerprint::of(b"v1")), ids(&["a", "b"]));
        store.save_file("a.rs", &entry).await.unwrap();
        let entry = FileEntry::committed(Some(Fingerprint::of(b"v2")), ids(&["c"]));
        store.save_file("a.rs", &entry).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.get("a.rs").unwrap().chunk_ids, ids(&["c"]));
    }

    #[tokio::test]
    async fn remove_cascades_to_chunks() {
        let store = StateStore::open(":memory:").await.unwrap();
        let entry = FileEntry::committed(Some(Fingerprint::of(b"v1")), ids(&["a"]));
        store.save_file("a.rs", &entry).await.unwrap();
        store.remove_file("a.rs").await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM indexed_chunks")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn model_recorded_and_cleared() {
        let store = StateStore::open(":memory:").await.unwrap();
        assert_eq!(store.model().await.unwrap(), None);
        store.set_model("BAAI/bge-small-en-v1.5").await.unwrap();
        assert_eq!(
            store.model().await.unwrap().as_deref(),
            Some("BAAI/bge-small-en-v1.5")
        );
        store.clear().await.unwrap();
        assert_eq!(store.model().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_str().unwrap();
        {
            let store = StateStore::open(path).await.unwrap();
            let entry = FileEntry::committed(Some(Fingerprint::of(b"v1")), ids(&["a"]));
            store.save_file("a.rs", &entry).await.unwrap();
        }
        let store = StateStore::open(path).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }
}
